use servicelog_tools::commands::repair::RepairArgs;

fn main() { servicelog_tools::cli::main::<RepairArgs>() }
