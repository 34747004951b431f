pub mod period_comparison;
