#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alignment;
pub mod analyzer;
pub mod builder;
pub mod config;
pub mod evidence;
pub mod mapping;
pub mod markup;
pub mod observability;
pub mod pipeline;
pub mod pitch;
pub mod refine;
pub mod token;
pub mod tracker;
pub mod util;
