use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use relative_path::{RelativePath, RelativePathBuf};
use std::{env, fs::File, io::stdout, path::PathBuf, process};
use vrc_auton_config::Config;
use vrc_auton_engine::{
    Action, ActionNode, AutonCatalog, EditOperation, HostEdit, HostNotification, Selector,
    Session, WaitParams, io,
};

/// Length of the wait appended by `a`
const DEFAULT_WAIT_MS: i64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Files,
    Actions,
}

struct OpenFile {
    path: RelativePathBuf,
    session: Session,
    dirty: bool,
}

struct App {
    project_path: PathBuf,
    catalog: AutonCatalog,
    files: Vec<RelativePathBuf>,
    file_list_state: ListState,
    action_list_state: ListState,
    focus: Pane,
    open: Option<OpenFile>,
    status: String,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let files = config.auton_files()?;
        let catalog = AutonCatalog::load(&config.project_path, &files)?;
        let files: Vec<RelativePathBuf> = catalog
            .files()
            .map(RelativePath::to_relative_path_buf)
            .collect();

        let mut app = Self {
            project_path: config.project_path.clone(),
            catalog,
            files,
            file_list_state: ListState::default(),
            action_list_state: ListState::default(),
            focus: Pane::Files,
            open: None,
            status: String::new(),
        };

        if !app.files.is_empty() {
            app.file_list_state.select(Some(0));
        }
        app.status = format!("{} auton file(s)", app.files.len());

        Ok(app)
    }

    fn move_selection(&mut self, forward: bool) {
        let (state, len) = match self.focus {
            Pane::Files => (&mut self.file_list_state, self.files.len()),
            Pane::Actions => (
                &mut self.action_list_state,
                self.open.as_ref().map_or(0, |open| open.session.nodes().len()),
            ),
        };
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if forward => (i + 1) % len,
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        state.select(Some(i));

        if self.focus == Pane::Actions
            && let Some(open) = self.open.as_mut()
            && let Err(e) = open.session.select(Selector::Index(i))
        {
            self.status = format!("Selection failed: {e}");
        }
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Pane::Files if self.open.is_some() => Pane::Actions,
            _ => Pane::Files,
        };
    }

    fn open_selected_file(&mut self) {
        if self.open.as_ref().is_some_and(|open| open.dirty) {
            self.status = "Unsaved changes, press w to write first".to_string();
            return;
        }
        let Some(path) = self
            .file_list_state
            .selected()
            .and_then(|index| self.files.get(index))
            .cloned()
        else {
            return;
        };

        match io::read_file(&path, &self.project_path) {
            Ok(content) => match Session::open(&content) {
                Ok(session) => {
                    self.status = format!("{path}: {} action(s)", session.nodes().len());
                    self.action_list_state
                        .select((!session.nodes().is_empty()).then_some(0));
                    self.open = Some(OpenFile {
                        path,
                        session,
                        dirty: false,
                    });
                    self.focus = Pane::Actions;
                }
                Err(e) => self.status = format!("Error reading auton: {e}"),
            },
            Err(e) => self.status = format!("Error reading file: {e}"),
        }
    }

    /// Run a structural edit and feed the resulting text edit back as the
    /// host's echo, as an editor applying it would
    fn apply(&mut self, edit: impl FnOnce(&mut Session) -> Result<Option<HostEdit>>) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        match edit(&mut open.session) {
            Ok(Some(host_edit)) => {
                let echo = HostNotification::echo(host_edit.seq, host_edit.as_changes());
                if let Err(e) = open.session.handle_host_notification(echo) {
                    self.status = format!("Echo failed: {e}");
                    return;
                }
                open.dirty = true;
                self.status = format!("{} text edit(s) applied", host_edit.edits.len());
            }
            Ok(None) => self.status = "Nothing to do".to_string(),
            Err(e) => self.status = format!("Edit rejected: {e}"),
        }

        let len = self.open.as_ref().map_or(0, |open| open.session.nodes().len());
        let selected = self.action_list_state.selected().map(|i| i.min(len.saturating_sub(1)));
        self.action_list_state.select(if len == 0 { None } else { selected });
    }

    fn delete_selected_action(&mut self) {
        let Some(index) = self.action_list_state.selected() else {
            return;
        };
        self.apply(|session| {
            Ok(session
                .apply_view_edit(EditOperation::remove(index, 1))?
                .map(|(host_edit, _)| host_edit))
        });
    }

    fn append_wait(&mut self) {
        let index = self
            .action_list_state
            .selected()
            .map(|i| i + 1)
            .or_else(|| self.open.as_ref().map(|open| open.session.nodes().len()))
            .unwrap_or(0);
        let wait = ActionNode::new(Action::Wait(WaitParams {
            milliseconds: DEFAULT_WAIT_MS,
        }));
        self.apply(|session| {
            Ok(session
                .apply_view_edit(EditOperation::insert(index, vec![wait]))?
                .map(|(host_edit, _)| host_edit))
        });
        if let Some(open) = &self.open
            && index < open.session.nodes().len()
        {
            self.action_list_state.select(Some(index));
        }
    }

    fn undo(&mut self) {
        self.apply(|session| Ok(session.undo()?.map(|(host_edit, _)| host_edit)));
    }

    fn redo(&mut self) {
        self.apply(|session| Ok(session.redo()?.map(|(host_edit, _)| host_edit)));
    }

    fn write(&mut self) -> Result<()> {
        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };
        let text = open.session.text();
        io::write_file(&open.path, &self.project_path, &text)
            .with_context(|| format!("writing {}", open.path))?;
        self.catalog
            .set_file(open.path.clone(), open.session.nodes().to_vec());
        open.dirty = false;
        self.status = format!("Wrote {}", open.path);
        Ok(())
    }

    fn action_lines(&self) -> Vec<ListItem<'static>> {
        let Some(open) = &self.open else {
            return Vec::new();
        };
        open.session
            .nodes()
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let params = node
                    .action
                    .params()
                    .iter()
                    .map(|(name, value)| format!("{name}={}", value.to_source()))
                    .collect::<Vec<_>>()
                    .join(" ");
                let line = node.source.as_ref().map_or_else(
                    || "unsynced".to_string(),
                    |span| format!("@{}", open.session.rope().line_of_offset(span.offset) + 1),
                );
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{index:>3} "), Style::default().fg(Color::DarkGray)),
                    Span::styled(
                        format!("{:<14}", node.kind().name()),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!("{params} ")),
                    Span::styled(line, Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect()
    }
}

fn load_config(args: &[String]) -> Config {
    let config_path = Config::config_path();

    let (config, from_config) = match args.len() {
        2 => (Config::new(&args[1]), false),
        1 => match Config::load() {
            Ok(Some(config)) => (config, true),
            Ok(None) => {
                eprintln!("Error: No project path provided and no config file found");
                eprintln!("Usage: {} <project-path>", args[0]);
                eprintln!("Or create a config file at {}", config_path.display());
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: Failed to load config file: {e}");
                eprintln!("Usage: {} <project-path>", args[0]);
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage: {} [project-path]", args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = io::validate_project_dir(&config.project_path) {
        let source = if from_config {
            format!(" from config file '{}'", config_path.display())
        } else {
            String::new()
        };
        eprintln!(
            "Error: Project path '{}'{} is invalid: {e}",
            config.project_path.display(),
            source
        );
        process::exit(1);
    }

    config
}

/// The terminal belongs to the TUI, so logs only go to a file when asked
fn init_logging() -> Result<()> {
    if let Ok(log_path) = env::var("VRC_AUTON_LOG") {
        let file = File::create(&log_path).with_context(|| format!("creating log {log_path}"))?;
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    let args: Vec<String> = env::args().collect();
    let config = load_config(&args);
    let mut app = App::new(&config)?;
    log::info!("opened project {}", config.project_path.display());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.move_selection(true),
                KeyCode::Up | KeyCode::Char('k') => app.move_selection(false),
                KeyCode::Tab => app.toggle_focus(),
                KeyCode::Enter if app.focus == Pane::Files => app.open_selected_file(),
                KeyCode::Char('d') if app.focus == Pane::Actions => app.delete_selected_action(),
                KeyCode::Char('a') if app.focus == Pane::Actions => app.append_wait(),
                KeyCode::Char('u') => app.undo(),
                KeyCode::Char('r') => app.redo(),
                KeyCode::Char('w') => {
                    if let Err(e) = app.write() {
                        app.status = format!("Write failed: {e}");
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)])
        .split(f.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[0]);

    let focus = app.focus;
    let focused = |pane: Pane| {
        if focus == pane {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        }
    };

    let file_items: Vec<ListItem> = app
        .files
        .iter()
        .map(|path| {
            let count = app.catalog.file_actions(path).map_or(0, <[_]>::len);
            ListItem::new(Line::from(vec![
                Span::raw(path.to_string()),
                Span::styled(format!(" ({count})"), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let files_list = List::new(file_items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focused(Pane::Files))
                .title("Autons"),
        )
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));
    f.render_stateful_widget(files_list, chunks[0], &mut app.file_list_state);

    let title = match &app.open {
        Some(open) if open.session.is_desynced() => format!("{} [desynced]", open.path),
        Some(open) if open.dirty => format!("{} [+]", open.path),
        Some(open) => open.path.to_string(),
        None => "Actions".to_string(),
    };
    let action_items = if app.open.is_some() {
        app.action_lines()
    } else {
        vec![ListItem::new("Select a file and press Enter")]
    };
    let actions_list = List::new(action_items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focused(Pane::Actions))
                .title(title),
        )
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));
    f.render_stateful_widget(actions_list, chunks[1], &mut app.action_list_state);

    let help = Paragraph::new(vec![
        Line::from(Span::styled(
            app.status.clone(),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(
            "q: Quit | j/k: Move | Tab: Switch pane | Enter: Open | d: Delete | a: Add wait | u/r: Undo/Redo | w: Write",
        ),
    ]);
    f.render_widget(help, rows[1]);
}
