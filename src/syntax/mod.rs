pub mod sentence;
pub mod step_kind;
