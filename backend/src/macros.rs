//! Crate-internal macros.

/// Implement `fmt::Debug` without leaking secrets.
///
/// Each field is listed with a mode: `show` prints the value, `redact` prints
/// `"[REDACTED]"`, and `redact_option` prints `Some("[REDACTED]")` or `None`.
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut s = f.debug_struct(stringify!($name));
                $( redacted_debug!(@field s, self, $kind, $field); )*
                s.finish_non_exhaustive()
            }
        }
    };
    (@field $s:ident, $self:ident, show, $field:ident) => {
        $s.field(stringify!($field), &$self.$field);
    };
    (@field $s:ident, $self:ident, redact, $field:ident) => {
        $s.field(stringify!($field), &"[REDACTED]");
    };
    (@field $s:ident, $self:ident, redact_option, $field:ident) => {
        $s.field(stringify!($field), &$self.$field.as_ref().map(|_| "[REDACTED]"));
    };
}

#[cfg(test)]
mod tests {
    #[allow(dead_code)]
    struct ProviderSettings {
        endpoint: String,
        api_key: String,
        admin_token: Option<String>,
    }

    redacted_debug!(ProviderSettings {
        show endpoint,
        redact api_key,
        redact_option admin_token,
    });

    #[test]
    fn test_secrets_are_hidden() {
        let s = ProviderSettings {
            endpoint: "http://ocr.local".into(),
            api_key: "ocr-key-123".into(),
            admin_token: Some("tok-456".into()),
        };
        let output = format!("{:?}", s);
        assert!(output.contains("http://ocr.local"));
        assert!(!output.contains("ocr-key-123"));
        assert!(!output.contains("tok-456"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_absent_option_prints_none() {
        let s = ProviderSettings {
            endpoint: "x".into(),
            api_key: "hidden".into(),
            admin_token: None,
        };
        let output = format!("{:?}", s);
        assert!(output.contains("admin_token: None"));
        assert!(!output.contains("hidden"));
    }
}
