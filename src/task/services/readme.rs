//! README rendering for generated bundles.

use crate::task::{domain::SourceBundle, ports::GenerationRequest};
use minijinja::{Environment, context};

/// Path of the rendered README inside a bundle.
pub const README_PATH: &str = "README.md";

const README_TEMPLATE: &str = "# {{ task_id }}

{{ brief }}
{% if checks %}
## Acceptance checks

{% for check in checks %}- {{ check }}
{% endfor %}{% endif %}
## History

This artifact was built from a `{{ template }}` brief and last revised in round {{ round }}.
{% if round > 1 %}Earlier rounds are superseded; the live page always reflects the latest round.
{% endif %}
## License

MIT
";

/// Renders the README shipped with every round's bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadmeRenderer;

impl ReadmeRenderer {
    /// Renders the README for a round.
    ///
    /// # Errors
    ///
    /// Returns [`minijinja::Error`] if the template fails to render.
    pub fn render(self, request: &GenerationRequest) -> Result<String, minijinja::Error> {
        let environment = Environment::new();
        environment.render_str(
            README_TEMPLATE,
            context! {
                task_id => request.task_id.as_str(),
                template => request.template.as_str(),
                round => request.round.value(),
                brief => request.brief.as_str(),
                checks => &request.checks,
            },
        )
    }

    /// Returns `bundle` with a freshly rendered README.
    ///
    /// A render failure leaves the bundle as generated.
    #[must_use]
    pub fn attach(self, bundle: SourceBundle, request: &GenerationRequest) -> SourceBundle {
        match self.render(request) {
            Ok(readme) => bundle.with_file(README_PATH, readme),
            Err(err) => {
                tracing::warn!(
                    task_id = %request.task_id,
                    round = %request.round,
                    error = %err,
                    "README rendering failed; keeping generated bundle"
                );
                bundle
            }
        }
    }
}
