pub mod backend_api;
pub mod buy_orders;
pub mod cache;
pub mod item_nameid;
pub mod listings;
pub mod market;
pub mod price_history;
pub mod retry;
pub mod types;
