//! The trade coordinator: an off-chain approval service for a smart-contract
//! exchange. Makers name the coordinator as their orders' fee recipient;
//! takers must obtain a signed, time-bounded approval here before they can
//! broadcast a fill.

pub mod api;
pub mod arguments;
pub mod classifier;
pub mod conversions;
pub mod decoder;
pub mod engine;
pub mod events;
pub mod fillable;
pub mod oracle;
pub mod run;
pub mod settings;
pub mod storage;
pub mod validation;
