//! Risk management: the stateful gate consulted before every order.

pub mod checker;

pub use checker::{RiskChecker, RiskConfig, RiskDecision, RiskStatus};
