// Alert assembly and delivery.
//
// Architecture:
// - model.rs: Alert value, alert types, contacts and the dispatch context
// - responder.rs: the remote responder endpoint (trait + HTTP client)
// - feedback.rs: vibration and audible cue on dispatch
// - dispatcher.rs: builds the alert and fans it out to the UI and responder

pub mod dispatcher;
pub mod feedback;
pub mod model;
pub mod responder;
