//! CLI subcommands

pub mod chat;
pub mod recharge;
pub mod status;
