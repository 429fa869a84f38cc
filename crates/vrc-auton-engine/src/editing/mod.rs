pub mod auton;
pub mod history;
pub mod reparse;
pub mod synth;

pub use auton::{Auton, AutonError, AutonEvent, EditOperation, EditOrigin, EditSeq, SubscriptionId};
pub use history::{CommandList, ListCommand, ListError, ListQuery, Splice};
pub use reparse::{ContentChange, OffsetShift, ReparsePlan, TextSource, plan_reparse};
pub use synth::{SynthError, Synthesis, TextEdit, generate, patch_action, synthesize};
