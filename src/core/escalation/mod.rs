// Escalation of a possible emergency into a dispatched alert.
//
// - actions.rs: the action menu entries and what each one does
// - machine.rs: the state machine owning countdown, capture and dispatch hand-off

pub mod actions;
pub mod machine;

pub use actions::{ActionEffect, ActionHandler, ActionKind};
pub use machine::{
    AlertEscalationStateMachine, CycleOutcome, EscalationState, TriggerSignal, TriggerSource,
};
