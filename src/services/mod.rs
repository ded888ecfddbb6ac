pub mod graph;
pub mod image;
pub mod llm;
pub mod placeholder;
pub mod planner;
pub mod resolver;
pub mod synthesizer;
pub mod validator;
pub mod visuals;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
