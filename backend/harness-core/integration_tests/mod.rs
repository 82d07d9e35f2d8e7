mod error;
mod helpers;
mod provision;
mod readiness;
mod supervisor;
