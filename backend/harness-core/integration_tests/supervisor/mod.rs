mod handle;
mod launch;
mod shutdown;
