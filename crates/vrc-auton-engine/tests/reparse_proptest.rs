//! Random host edits fed through a session must leave the model equal to a
//! full rescan of the text.
//!
//! Documents and inserted text avoid comments and string literals, where an
//! incremental rescan can legitimately disagree with a full one.

use std::ops::Range;

use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::{Config, RngAlgorithm, TestCaseError, TestRng, TestRunner};
use rstest::rstest;
use vrc_auton_engine::{
    Action, ActionKind, ActionNode, ContentChange, HostNotification, Session, SessionError, scan,
};

/// Fragments of calls, whole calls and punctuation
const SNIPPETS: &[&str] = &[
    "",
    "\n",
    " ",
    ";",
    "(",
    ")",
    ",",
    "1",
    "-2.5",
    "x",
    "auton",
    "::",
    "auton::",
    "wait(",
    "setPose",
    "roller();",
    ", true);",
    "auton::wait(7);",
    "auton::intake();\n",
    "auton::setPose(4, 5, 6);",
    "auton::moveTo(1, 2, 300);",
    "auton::turnTo(0, 0, 100",
];

/// Where to edit, how many bytes to remove and what to insert
type RandomEdit = (Index, usize, &'static str);

fn host_edits() -> impl Strategy<Value = Vec<RandomEdit>> {
    prop::collection::vec(
        (any::<Index>(), 0usize..12, prop::sample::select(SNIPPETS)),
        1..6,
    )
}

fn layout(nodes: &[ActionNode]) -> Vec<(Action, Option<(Range<usize>, String)>)> {
    nodes
        .iter()
        .map(|node| {
            let source = node.source.as_ref().map(|span| (span.range(), span.text.clone()));
            (node.action.clone(), source)
        })
        .collect()
}

fn apply_edits(base: &str, edits: Vec<RandomEdit>) -> Result<(), TestCaseError> {
    let mut session = Session::open(base).map_err(|err| TestCaseError::fail(err.to_string()))?;
    for (at, removed, inserted) in edits {
        let len = session.text().len();
        let start = at.index(len + 1);
        let end = (start + removed).min(len);
        let outcome = session.handle_host_notification(HostNotification::change(
            ContentChange::new(start..end, inserted),
        ));

        let text = session.text();
        let scanned = scan(&text);
        match outcome {
            Ok(_) => prop_assert_eq!(layout(session.nodes()), layout(&scanned), "text: {:?}", text),
            Err(SessionError::Desynced) => prop_assert!(
                scanned.first().is_none_or(|node| node.kind() != ActionKind::SetPose),
                "desynced although {:?} starts with a pose",
                text
            ),
            Err(err) => return Err(TestCaseError::fail(format!("{err} for {text:?}"))),
        }
    }
    Ok(())
}

#[rstest]
#[case::separate_lines("auton::setPose(0, 0, 0);\nauton::moveTo(24.5, 36, 1000);\n\nauton::wait(10);\n")]
#[case::routine(
    "void autonomous() {
  auton::setPose(-36, 60, 90);
  auton::intake();
  auton::moveTo(-12.5, 48, 1500, 90);
  auton::turnTo(0, 0, 800);
  auton::wait(250);
  auton::shoot();
}
"
)]
#[case::shared_line("auton::setPose(1, 2, 3); auton::roller(); auton::wait(5); auton::expand();")]
fn random_host_edits_match_a_full_rescan(#[case] base: &str) {
    let config = Config {
        cases: 256,
        failure_persistence: None,
        ..Config::default()
    };
    let mut runner =
        TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha));

    if let Err(failure) = runner.run(&host_edits(), |edits| apply_edits(base, edits)) {
        panic!("{failure}");
    }
}
