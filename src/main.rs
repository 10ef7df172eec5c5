use crate::shell::start_shell;

mod disk;
mod fs;
mod shell;
mod utils;

#[cfg(test)]
mod testing;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    start_shell();
}
