// tally-core/src/domain/scan/filter.rs

// The row filter is a Jinja template (e.g. `date = DATE '{{ date }}'`) rendered
// with the scan variables right before the aggregation query is built.

use minijinja::{Environment, UndefinedBehavior};
use std::fmt;

const TEMPLATE_NAME: &str = "filter";

#[derive(Clone)]
pub struct FilterTemplate {
    source: String,
    env: Environment<'static>,
}

impl FilterTemplate {
    /// Compiles the template once; syntax errors surface here, not at render time.
    pub fn compile(source: &str) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        // a typo in a variable name must not silently widen the scan
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned(TEMPLATE_NAME, source.to_string())?;
        Ok(Self {
            source: source.to_string(),
            env,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, variables: &serde_json::Value) -> Result<String, minijinja::Error> {
        let rendered = self.env.get_template(TEMPLATE_NAME)?.render(variables)?;
        Ok(rendered.trim().to_string())
    }
}

impl fmt::Debug for FilterTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterTemplate")
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for FilterTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
