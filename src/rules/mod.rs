//! Builtin signal rules
//!
//! One module per tier group. Every rule is parameterized from
//! [`StrategyConfig`](crate::config::StrategyConfig) via `from_config`.
//!
//! # Tiers
//!
//! 1. **Volume thrust**: breakout / breakdown on expanding volume
//! 2. **Pattern**: double bottom / double top pivots
//! 3. **Baseline cross**: turn bullish / turn bearish
//! 4. **Trend slope**: bottom turning / top consolidating
//! 5. **Divergence**: volume up, price down
//! 6. **Congestion**: shortest averages converge
//! 7. **Deviation**: elevated / severe distance above the baseline
//! 8. **Fallback**: drift message when nothing else fired

pub mod helpers;

/// Generate `Default` (from the default config) and `with_defaults()` for rule types.
macro_rules! impl_with_defaults {
    ($($rule:ty),* $(,)?) => {
        $(
            impl Default for $rule {
                fn default() -> Self {
                    Self::from_config(&crate::config::StrategyConfig::default())
                }
            }

            impl $rule {
                pub fn with_defaults() -> Self {
                    Self::default()
                }
            }
        )*
    };
}

pub mod congestion;
pub mod crossing;
pub mod deviation;
pub mod drift;
pub mod pivot;
pub mod slope;
pub mod volume;

pub use congestion::*;
pub use crossing::*;
pub use deviation::*;
pub use drift::*;
pub use helpers::*;
pub use pivot::*;
pub use slope::*;
pub use volume::*;
