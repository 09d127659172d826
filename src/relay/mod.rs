pub mod adapter;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod info;
pub mod ledger;
pub mod pricing;
pub mod router;
pub mod select;

pub use router::create_relay_router;
