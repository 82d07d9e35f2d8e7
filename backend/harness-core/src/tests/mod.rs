mod config;
mod readiness;
mod supervisor;
