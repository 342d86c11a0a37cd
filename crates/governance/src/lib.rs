//! Governance engine for CAST
//!
//! This crate turns verified requests into governance state:
//! - [`roles`] decides who may act in a community
//! - [`strategy`] computes voting weights from chain snapshots
//! - [`ledger`] records votes and tallies them
//! - [`achievements`] rewards winning voters once a proposal closes
//! - [`manager`] creates and cancels proposals
//!
//! [`GovernanceService`] wires all of them to one store and chain client.

pub mod achievements;
pub mod ledger;
pub mod manager;
pub mod roles;
pub mod service;
pub mod strategy;

#[cfg(test)]
mod fixtures;

pub use achievements::AchievementTrigger;
pub use ledger::VoteLedger;
pub use manager::{ProposalDraft, ProposalManager};
pub use roles::{AccessLists, RoleAuthorizer};
pub use service::GovernanceService;
pub use strategy::{Strategy, StrategyEngine, WeightQuery};
