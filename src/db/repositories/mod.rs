mod emulators;
mod macro_runs;
mod snapshots;
mod task_runs;
