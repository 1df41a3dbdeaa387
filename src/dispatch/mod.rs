mod dispatcher;
mod error;

pub use dispatcher::{
    CommandDispatcher, Offsets, EMERGENCY_ENGAGE, EMERGENCY_RELEASE, FEED_MASK_ALL,
};
pub use error::DispatchError;

#[cfg(test)]
pub(crate) use dispatcher::tests::RecordingSink;
