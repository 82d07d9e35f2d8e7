mod provision;
mod shutdown;
mod spawn;
