mod confirmation;
mod content_change;
mod unusable_share;

pub use keyward_test_utils as test_utils;
