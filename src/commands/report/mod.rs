mod filters;
mod pipeline;
mod run;

pub use run::run;

use filters::*;
use pipeline::*;
