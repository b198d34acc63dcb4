use crate::git::GitError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Classification {
    /// Matches a configured ignore substring; logged but not fatal.
    Ignored,
    Real,
}

/// Decides which failures count towards the final verdict.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    ignored: Vec<String>,
}

impl ErrorClassifier {
    /// Empty patterns are dropped since they would match every message.
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored
                .into_iter()
                .map(Into::into)
                .filter(|pattern: &String| !pattern.is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.ignored
    }

    pub fn classify_message(&self, message: &str) -> Classification {
        classify_message(message, &self.ignored)
    }

    /// Credential failures always surface, whatever the ignore list says.
    pub fn classify(&self, err: &GitError, rendered: &str) -> Classification {
        if err.is_auth_required() {
            return Classification::Real;
        }
        self.classify_message(rendered)
    }
}

/// Case-sensitive substring match against the ignore list.
pub fn classify_message<S: AsRef<str>>(message: &str, ignored: &[S]) -> Classification {
    let matched = ignored.iter().any(|pattern| {
        let pattern: &str = pattern.as_ref();
        !pattern.is_empty() && message.contains(pattern)
    });
    if matched {
        Classification::Ignored
    } else {
        Classification::Real
    }
}

pub fn render_error(activity: &str, url: &str, err: &dyn std::fmt::Display) -> String {
    format!("Error while {activity} {url}: {err}")
}
