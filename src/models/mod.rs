pub mod course;
pub mod registration;
pub mod watchlist;

pub use course::{CourseListing, CourseSnapshot, CourseStatus};
pub use registration::{RegistrationError, RegistrationOutcome};
pub use watchlist::{AddWatchRequest, WatchStatus, WatchlistEntry};
