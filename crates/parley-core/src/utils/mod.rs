pub mod debounce;
pub mod observers;

pub use debounce::Debouncer;
pub use observers::{ObserverRegistry, Subscription};
