use anyhow::Result;

/// Delivers the password reset link.
///
/// There is no SMTP relay in development, so this mirrors a mailer's
/// preview-URL behavior and writes the link to the log instead.
pub async fn send_reset_email(to: &str, reset_url: &str) -> Result<()> {
    log::info!("password reset for {}: {}", to, reset_url);
    Ok(())
}

pub fn reset_url(client_origin: &str, token: &str) -> String {
    format!("{}/change-password/{}", client_origin, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_targets_the_client_route() {
        assert_eq!(
            reset_url("http://localhost:3000", "tok-123"),
            "http://localhost:3000/change-password/tok-123"
        );
    }
}
