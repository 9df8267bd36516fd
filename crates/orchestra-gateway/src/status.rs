use orchestra_resilience::CollaboratorError;

/// Map a non-success HTTP status to a collaborator error.
///
/// 404 is `NotFound`; 408, 429 and 5xx are transient; any other status is a
/// rejection that will not succeed on retry.
pub fn classify_status(status: u16, body: &str) -> CollaboratorError {
  let message = if body.is_empty() {
    format!("status {status}")
  } else {
    format!("status {status}: {}", truncate(body, 200))
  };

  match status {
    404 => CollaboratorError::NotFound(message),
    408 | 429 | 500..=599 => CollaboratorError::Transient(message),
    _ => CollaboratorError::Validation(message),
  }
}

fn truncate(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}
