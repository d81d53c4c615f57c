fn main() { servicelog_tools::dispatch::main() }
