use servicelog_tools::commands::notify::NotifyArgs;

fn main() { servicelog_tools::cli::main::<NotifyArgs>() }
