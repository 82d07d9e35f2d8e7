mod launch_options;
mod not_ready;
mod process;
