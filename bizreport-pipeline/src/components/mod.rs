pub mod asin_filter;
pub mod top_movers_selector;
pub mod unchanged_filter;
