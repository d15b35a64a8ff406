//! Deployment module

pub mod assembler;
pub mod docker;
pub mod fsm;
pub mod image;
pub mod locks;
pub mod orchestrator;
pub mod progress;
pub mod reconciler;
pub mod routing;
pub mod runtime;
pub mod scaffold;
