//!  Storage is organized through [observation_log::ObservationLogImpl].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored using record files, which hold data for a UTC day.
//!   - Every sample is one json line carrying the window data and the labels
//!     that matched it.

pub mod entities;
pub mod observation_log;
