//! Command-line front end for s3link
//!
//! ```bash
//! s3link ls s3://bucket/prefix/ --recursive
//! s3link put ./backup.tar s3://bucket/backups/
//! s3link get s3://bucket/backups/backup.tar ./restore.tar
//! s3link presign s3://bucket/report.pdf --expires 3600
//! ```

pub mod args;
pub mod commands;
