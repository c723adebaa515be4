pub mod command;
pub mod lock;
pub mod paths;

#[cfg(test)]
pub(crate) mod testing;
