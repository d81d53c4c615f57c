use servicelog_tools::commands::legacy_query::LegacyQueryArgs;

fn main() { servicelog_tools::cli::main::<LegacyQueryArgs>() }
