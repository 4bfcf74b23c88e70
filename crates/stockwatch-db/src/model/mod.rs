pub mod activity;
pub mod stock_history;
pub mod tracked_product;
pub mod user;
