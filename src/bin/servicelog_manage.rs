use servicelog_tools::commands::manage::ManageArgs;

fn main() { servicelog_tools::cli::main::<ManageArgs>() }
