use servicelog_tools::commands::common_event::CommonEventArgs;

fn main() { servicelog_tools::cli::main::<CommonEventArgs>() }
