pub mod number;
pub mod time;

pub use number::{format_money, serialize_money};
pub use time::{lookback_range, DateRange};
