use crate::actions::{Action, ActionId, ActionNode, SourceSpan};
use crate::parsing::patterns::PatternLibrary;

/// Recognise every complete action call in `text`, in source order.
pub fn scan(text: &str) -> Vec<ActionNode> {
    scan_with_offset(text, 0)
}

/// Like [`scan`], with every reported offset shifted by `bias`.
///
/// Used when `text` is a fragment starting at byte `bias` of a document.
pub fn scan_with_offset(text: &str, bias: usize) -> Vec<ActionNode> {
    let library = PatternLibrary::standard();

    let mut matches = Vec::new();
    for pattern in library.iter() {
        for captures in pattern.regex.captures_iter(text) {
            if let Some(whole) = captures.get(0) {
                matches.push((whole.start(), whole.end(), pattern, captures));
            }
        }
    }
    matches.sort_by_key(|(start, end, _, _)| (*start, *end));

    let mut nodes = Vec::with_capacity(matches.len());
    let mut covered_until = 0;
    for (start, end, pattern, captures) in matches {
        if start < covered_until {
            log::trace!("skipping {} at {start}: overlaps previous call", pattern.kind);
            continue;
        }
        let Some((values, param_spans)) = pattern.extract(&captures) else {
            continue;
        };
        let Some(action) = Action::from_params(pattern.kind, &values) else {
            continue;
        };
        covered_until = end;
        nodes.push(ActionNode {
            id: ActionId::new(),
            action,
            source: Some(SourceSpan {
                offset: start + bias,
                end_offset: end + bias,
                text: text[start..end].to_string(),
                param_spans,
            }),
        });
    }
    nodes
}
