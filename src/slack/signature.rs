//! Slack request signature verification.
//!
//! Slack signs every slash command and event request:
//!
//! 1. Concatenate `v0:{timestamp}:{body}` as the base string.
//! 2. Compute `HMAC-SHA256(signing_secret, base_string)`.
//! 3. Compare `v0={hex_digest}` against `X-Slack-Signature`.
//!
//! Requests whose timestamp is more than five minutes away from now are
//! rejected as replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Header carrying the request timestamp (unix seconds).
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Maximum clock skew accepted, in seconds.
const MAX_TIMESTAMP_AGE_SECS: u64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Verify a Slack request signature against the current time.
pub fn verify_signature(signing_secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    verify_signature_at(
        signing_secret,
        timestamp,
        body,
        signature,
        chrono::Utc::now().timestamp(),
    )
}

/// Verify a Slack request signature as of `now` (unix seconds).
pub fn verify_signature_at(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if now.abs_diff(ts) > MAX_TIMESTAMP_AGE_SECS {
        return false;
    }

    let Some(digest) = signature
        .strip_prefix("v0=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    // Constant-time comparison.
    mac.verify_slice(&digest).is_ok()
}

/// Compute the `v0={hex}` signature for a request.
pub fn compute_signature(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC key of any length is valid");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn valid_signature() {
        let timestamp = now().to_string();
        let body = b"token=xyz&command=%2Fleave-list&user_id=U1";
        let sig = compute_signature(TEST_SECRET, &timestamp, body);
        assert!(verify_signature(TEST_SECRET, &timestamp, body, &sig));
    }

    #[test]
    fn known_vector_from_slack_docs() {
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        assert!(verify_signature_at(
            TEST_SECRET,
            "1531420618",
            body,
            "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503",
            1531420618,
        ));
    }

    #[test]
    fn invalid_signature() {
        let timestamp = now().to_string();
        assert!(!verify_signature(
            TEST_SECRET,
            &timestamp,
            b"some body",
            "v0=0000000000000000000000000000000000000000000000000000000000000000"
        ));
    }

    #[test]
    fn wrong_body_fails() {
        let timestamp = now().to_string();
        let sig = compute_signature(TEST_SECRET, &timestamp, b"original body");
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"tampered body", &sig));
    }

    #[test]
    fn stale_timestamp_fails() {
        let timestamp = (now() - 600).to_string();
        let sig = compute_signature(TEST_SECRET, &timestamp, b"body");
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"body", &sig));
    }

    #[test]
    fn future_timestamp_fails() {
        let timestamp = (now() + 600).to_string();
        let sig = compute_signature(TEST_SECRET, &timestamp, b"body");
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"body", &sig));
    }

    #[test]
    fn timestamp_within_window_succeeds() {
        let timestamp = (now() - 120).to_string();
        let sig = compute_signature(TEST_SECRET, &timestamp, b"body");
        assert!(verify_signature(TEST_SECRET, &timestamp, b"body", &sig));
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let now = now();
        for ts in [i64::MIN.to_string(), i64::MAX.to_string()] {
            let sig = compute_signature(TEST_SECRET, &ts, b"body");
            assert!(!verify_signature_at(TEST_SECRET, &ts, b"body", &sig, now));
            assert!(!verify_signature_at(TEST_SECRET, &ts, b"body", "v0=00", now));
        }
        assert!(!verify_signature_at(TEST_SECRET, "0", b"body", "v0=00", i64::MIN));
    }

    #[test]
    fn malformed_inputs_fail() {
        let timestamp = now().to_string();
        assert!(!verify_signature(TEST_SECRET, "not-a-number", b"body", "v0=abc"));
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"body", ""));
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"body", "v0=zz"));

        let sig = compute_signature(TEST_SECRET, &timestamp, b"body");
        assert!(!verify_signature(TEST_SECRET, &timestamp, b"body", &sig[3..]));
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let timestamp = now().to_string();
        assert_ne!(
            compute_signature("secret-one", &timestamp, b"body"),
            compute_signature("secret-two", &timestamp, b"body")
        );
    }
}
