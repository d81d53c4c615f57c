use servicelog_tools::commands::query::QueryArgs;

fn main() { servicelog_tools::cli::main::<QueryArgs>() }
