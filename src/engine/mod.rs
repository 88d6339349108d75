pub mod dispatch;
pub mod lifecycle;
pub mod queue;
pub mod shifts;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testutil;
