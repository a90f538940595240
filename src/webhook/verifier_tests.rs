//! Tests for `WebhookVerifier`.

use super::{DEFAULT_TOLERANCE, SIGNATURE_HEADER, SignatureError, WebhookVerifier};
use crate::time::{FixedClock, SystemClock};
use http::{HeaderMap, HeaderValue};
use serde_json::json;
use std::time::Duration;

const SECRET: &str = "whsec_test";
const PAYLOAD: &str = r#"{"event":"test"}"#;
const NOW: i64 = 1_700_000_000;
/// HMAC-SHA256("whsec_test", "1700000000.{\"event\":\"test\"}")
const DIGEST_AT_NOW: &str = "21d2d3606ebbdbf9307ee15e83085df2b83c83dd87cc2e6d2ea6b1cb61afdc3c";

fn verifier() -> WebhookVerifier<FixedClock> {
    WebhookVerifier::new(SECRET).with_clock(FixedClock::from_unix_seconds(1_700_000_000))
}

mod signing {
    use super::*;

    #[test]
    fn generate_signature_at_matches_known_digest() {
        let header = verifier().generate_signature_at(PAYLOAD, NOW);

        assert_eq!(header, format!("t={NOW},v1={DIGEST_AT_NOW}"));
    }

    #[test]
    fn generate_signature_uses_clock() {
        assert_eq!(
            verifier().generate_signature(PAYLOAD),
            verifier().generate_signature_at(PAYLOAD, NOW)
        );
    }

    #[test]
    fn different_secrets_produce_different_digests() {
        let other = WebhookVerifier::new("whsec_other").with_clock(FixedClock::from_unix_seconds(0));

        assert_ne!(
            other.generate_signature_at(PAYLOAD, NOW),
            verifier().generate_signature_at(PAYLOAD, NOW)
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", verifier());

        assert!(!debug.contains(SECRET));
        assert!(debug.contains("<redacted>"));
    }
}

mod verify {
    use super::*;

    #[test]
    fn round_trip_with_system_clock() {
        let verifier = WebhookVerifier::new(SECRET);
        let header = verifier.generate_signature(PAYLOAD);

        let decoded = verifier.verify(PAYLOAD, &header).unwrap();

        assert_eq!(decoded, json!({"event": "test"}));
    }

    #[test]
    fn accepts_known_fixture() {
        let header = format!("t={NOW},v1={DIGEST_AT_NOW}");

        assert_eq!(verifier().verify(PAYLOAD, &header).unwrap(), json!({"event": "test"}));
    }

    #[test]
    fn accepts_byte_payloads() {
        let header = verifier().generate_signature_at(PAYLOAD, NOW);

        assert!(verifier().verify(PAYLOAD.as_bytes().to_vec(), &header).is_ok());
    }

    #[test]
    fn timestamp_at_window_edge_is_accepted() {
        let v = verifier();
        let tolerance = i64::try_from(DEFAULT_TOLERANCE.as_secs()).unwrap();

        for t in [NOW - tolerance, NOW + tolerance] {
            let header = v.generate_signature_at(PAYLOAD, t);
            assert!(v.verify(PAYLOAD, &header).is_ok(), "t={t}");
        }
    }

    #[test]
    fn expired_timestamp_is_rejected() {
        let v = verifier();
        let header = v.generate_signature_at(PAYLOAD, NOW - 301);

        let err = v.verify(PAYLOAD, &header).unwrap_err();

        assert!(matches!(
            err,
            SignatureError::Expired {
                timestamp,
                now: NOW,
                tolerance: 300
            } if timestamp == NOW - 301
        ));
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let v = verifier();
        let header = v.generate_signature_at(PAYLOAD, NOW + 301);

        let err = v.verify(PAYLOAD, &header).unwrap_err();

        assert!(matches!(err, SignatureError::FutureTimestamp { .. }));
    }

    #[test]
    fn explicit_tolerance_is_honored() {
        let v = verifier();
        let header = v.generate_signature_at(PAYLOAD, NOW - 100);

        assert!(v.verify_with_tolerance(PAYLOAD, &header, Duration::from_secs(100)).is_ok());
        assert!(matches!(
            v.verify_with_tolerance(PAYLOAD, &header, Duration::from_secs(99)),
            Err(SignatureError::Expired { .. })
        ));
    }

    #[test]
    fn sub_second_tolerance_still_enforces_window() {
        let v = verifier();
        let stale = v.generate_signature_at(PAYLOAD, 0);
        let current = v.generate_signature_at(PAYLOAD, NOW - 1);

        assert!(matches!(
            v.verify_with_tolerance(PAYLOAD, &stale, Duration::from_millis(500)),
            Err(SignatureError::Expired { tolerance: 1, .. })
        ));
        assert!(
            v.verify_with_tolerance(PAYLOAD, &current, Duration::from_millis(500))
                .is_ok()
        );
    }

    #[test]
    fn altered_digest_byte_is_invalid_signature() {
        let mut digest = DIGEST_AT_NOW.to_string();
        digest.replace_range(0..1, "3");
        let header = format!("t={NOW},v1={digest}");

        let err = verifier().verify(PAYLOAD, &header).unwrap_err();

        assert!(matches!(err, SignatureError::InvalidSignature));
    }

    #[test]
    fn tampered_payload_is_invalid_signature() {
        let header = format!("t={NOW},v1={DIGEST_AT_NOW}");

        let err = verifier()
            .verify(r#"{"event":"tampered"}"#, &header)
            .unwrap_err();

        assert!(matches!(err, SignatureError::InvalidSignature));
    }

    #[test]
    fn tampered_timestamp_is_invalid_signature() {
        let header = format!("t={},v1={DIGEST_AT_NOW}", NOW + 1);

        assert!(matches!(
            verifier().verify(PAYLOAD, &header),
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[test]
    fn non_hex_or_truncated_digest_is_invalid_signature() {
        for digest in ["zz", &DIGEST_AT_NOW[..32]] {
            let header = format!("t={NOW},v1={digest}");
            assert!(
                matches!(
                    verifier().verify(PAYLOAD, &header),
                    Err(SignatureError::InvalidSignature)
                ),
                "{digest}"
            );
        }
    }

    #[test]
    fn authentic_non_json_payload_is_invalid_payload() {
        let v = verifier();
        let header = v.generate_signature_at("not json", NOW);

        let err = v.verify("not json", &header).unwrap_err();

        assert!(matches!(err, SignatureError::InvalidPayload(_)));
    }

    #[test]
    fn malformed_header_is_invalid_format() {
        assert!(matches!(
            verifier().verify(PAYLOAD, "garbage"),
            Err(SignatureError::InvalidFormat(_))
        ));
    }
}

mod ignoring_timestamp {
    use super::*;

    #[test]
    fn accepts_old_signatures() {
        let v = verifier();
        let header = v.generate_signature_at(PAYLOAD, 1);

        assert_eq!(v.verify_ignoring_timestamp(PAYLOAD, &header).unwrap(), json!({"event": "test"}));
        assert!(v.verify(PAYLOAD, &header).is_err());
    }

    #[test]
    fn still_checks_the_digest() {
        let header = "t=1,v1=00";

        assert!(matches!(
            verifier().verify_ignoring_timestamp(PAYLOAD, header),
            Err(SignatureError::InvalidSignature)
        ));
    }
}

mod is_valid {
    use super::*;

    #[test]
    fn true_for_current_signature() {
        let v = verifier();
        let header = v.generate_signature(PAYLOAD);

        assert!(v.is_valid(PAYLOAD, &header));
    }

    #[test]
    fn false_for_any_malformed_header() {
        let v = verifier();
        for header in [
            "",
            "=",
            ",",
            "t=",
            "v1=",
            "t=x,v1=y",
            "t=99999999999999999999999,v1=aa",
            "t=-9223372036854775808,v1=aa",
            "t=1700000000,v1=\u{1F600}",
            "\0\0\0",
        ] {
            assert!(!v.is_valid(PAYLOAD, header), "{header:?}");
        }
    }
}

mod typed_and_headers {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Event {
        event: String,
    }

    #[test]
    fn verify_as_decodes_into_type() {
        let v = verifier();
        let header = v.generate_signature(PAYLOAD);

        let event: Event = v.verify_as(PAYLOAD, &header).unwrap();

        assert_eq!(
            event,
            Event {
                event: "test".to_string()
            }
        );
    }

    #[test]
    fn verify_as_rejects_wrong_shape() {
        let v = verifier();
        let payload = r#"{"kind":"test"}"#;
        let header = v.generate_signature(payload);

        assert!(matches!(
            v.verify_as::<Event>(payload, &header),
            Err(SignatureError::InvalidPayload(_))
        ));
    }

    #[test]
    fn verify_headers_reads_signature_header() {
        let v = verifier();
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::try_from(v.generate_signature(PAYLOAD)).unwrap(),
        );

        assert!(v.verify_headers(PAYLOAD, &headers).is_ok());
    }

    #[test]
    fn verify_headers_requires_the_header() {
        let err = verifier().verify_headers(PAYLOAD, &HeaderMap::new()).unwrap_err();

        assert!(matches!(err, SignatureError::InvalidFormat(_)));
    }

    #[test]
    fn verify_headers_rejects_non_ascii() {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_bytes(b"t=1,v1=\xff").unwrap());

        assert!(matches!(
            verifier().verify_headers(PAYLOAD, &headers),
            Err(SignatureError::InvalidFormat(_))
        ));
    }

    #[test]
    fn verifier_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WebhookVerifier<SystemClock>>();
        assert_send_sync::<SignatureError>();
    }
}
