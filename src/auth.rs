//! First-run authentication flow.
//!
//! Runs exactly once per unregistered connection handle and decides how
//! the operator links the device: a scannable QR, the raw QR payload in
//! the logs, or a pairing code for a phone number.

use std::io::{self, IsTerminal, Write};

use qrcode::{render::unicode, QrCode};
use thiserror::Error;

/// Minimum digit count for a pairing phone number (country code included).
pub const MIN_PHONE_DIGITS: usize = 10;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("phone number needs at least {MIN_PHONE_DIGITS} digits including country code, got {0}")]
    InvalidPhoneNumber(usize),
    #[error("failed to read operator input: {0}")]
    Prompt(#[from] io::Error),
    #[error("failed to render QR code: {0}")]
    Qr(String),
}

/// What the operator's environment looks like, injected so the branch
/// logic is testable without a TTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEnvironment {
    /// Whether an interactive terminal is attached.
    pub interactive: bool,
    /// Phone number configured for non-interactive pairing.
    pub phone_number: Option<String>,
}

impl AuthEnvironment {
    /// Detect the environment from stdin and the configured phone number.
    pub fn detect(phone_number: Option<String>) -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
            phone_number,
        }
    }
}

/// The auth method chosen for this first run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Request a pairing code for the sanitized phone number.
    PairingCode { phone: String },
    /// Render a scannable QR in the terminal on every QR update.
    RenderQr,
    /// Log the raw QR payload as text (no terminal to render on).
    LogQr,
}

/// Operator input source, fake-able in tests.
pub trait Prompt {
    fn read_line(&mut self, text: &str) -> io::Result<String>;
}

/// Prompt backed by stdin/stdout.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn read_line(&mut self, text: &str) -> io::Result<String> {
        print!("{text}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Strip everything but digits and enforce the minimum length.
pub fn sanitize_phone_number(raw: &str) -> Result<String, AuthError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(AuthError::InvalidPhoneNumber(digits.len()));
    }
    Ok(digits)
}

/// Format a pairing code in groups of four joined by hyphens,
/// e.g. `ABCD1234` becomes `ABCD-1234`.
pub fn format_pairing_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    chars
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Render a QR payload as a unicode block image for the terminal.
pub fn render_qr(data: &str) -> Result<String, AuthError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| AuthError::Qr(e.to_string()))?;
    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();
    Ok(image)
}

/// Instructions shown alongside a pairing code.
pub fn pairing_instructions() -> &'static str {
    "WhatsApp -> Settings -> Linked Devices -> Link with phone number"
}

/// Chooses the auth method for an unregistered handle.
pub struct AuthFlowSelector {
    env: AuthEnvironment,
}

impl AuthFlowSelector {
    pub fn new(env: AuthEnvironment) -> Self {
        Self { env }
    }

    /// Pick the auth method. A malformed phone number is rejected here,
    /// before any pairing-code request is made; the flow does not retry
    /// on invalid input.
    pub fn select(&self, prompt: &mut dyn Prompt) -> Result<AuthMethod, AuthError> {
        if !self.env.interactive {
            return match &self.env.phone_number {
                Some(raw) => Ok(AuthMethod::PairingCode {
                    phone: sanitize_phone_number(raw)?,
                }),
                None => Ok(AuthMethod::LogQr),
            };
        }

        println!("Choose login method");
        println!("  1) QR code (scan in WhatsApp)");
        println!("  2) Pairing code (enter your phone number)");
        let choice = prompt.read_line("Enter 1 or 2: ")?;

        if choice.trim() == "1" {
            Ok(AuthMethod::RenderQr)
        } else {
            let raw = prompt.read_line("Enter your WhatsApp number (e.g. 923232391033): ")?;
            Ok(AuthMethod::PairingCode {
                phone: sanitize_phone_number(&raw)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakePrompt {
        answers: VecDeque<String>,
    }

    impl FakePrompt {
        fn with(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Prompt for FakePrompt {
        fn read_line(&mut self, _text: &str) -> io::Result<String> {
            Ok(self.answers.pop_front().unwrap_or_default())
        }
    }

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(
            sanitize_phone_number("+92 323-239-1033").unwrap(),
            "923232391033"
        );
    }

    #[test]
    fn sanitize_rejects_short_numbers() {
        match sanitize_phone_number("12345") {
            Err(AuthError::InvalidPhoneNumber(5)) => {}
            other => panic!("expected InvalidPhoneNumber(5), got {other:?}"),
        }
    }

    #[test]
    fn pairing_code_grouping() {
        assert_eq!(format_pairing_code("ABCD1234"), "ABCD-1234");
        assert_eq!(format_pairing_code("12345678"), "1234-5678");
        assert_eq!(format_pairing_code("123456"), "1234-56");
    }

    #[test]
    fn non_interactive_with_phone_requests_pairing() {
        let selector = AuthFlowSelector::new(AuthEnvironment {
            interactive: false,
            phone_number: Some("92 3232391033".into()),
        });
        let method = selector.select(&mut FakePrompt::default()).unwrap();
        assert_eq!(
            method,
            AuthMethod::PairingCode {
                phone: "923232391033".into()
            }
        );
    }

    #[test]
    fn non_interactive_without_phone_logs_qr() {
        let selector = AuthFlowSelector::new(AuthEnvironment {
            interactive: false,
            phone_number: None,
        });
        let method = selector.select(&mut FakePrompt::default()).unwrap();
        assert_eq!(method, AuthMethod::LogQr);
    }

    #[test]
    fn interactive_choice_one_renders_qr() {
        let selector = AuthFlowSelector::new(AuthEnvironment {
            interactive: true,
            phone_number: None,
        });
        let method = selector.select(&mut FakePrompt::with(&["1"])).unwrap();
        assert_eq!(method, AuthMethod::RenderQr);
    }

    #[test]
    fn interactive_choice_two_prompts_for_number() {
        let selector = AuthFlowSelector::new(AuthEnvironment {
            interactive: true,
            phone_number: None,
        });
        let method = selector
            .select(&mut FakePrompt::with(&["2", "923232391033"]))
            .unwrap();
        assert_eq!(
            method,
            AuthMethod::PairingCode {
                phone: "923232391033".into()
            }
        );
    }

    #[test]
    fn interactive_short_number_rejected_before_any_request() {
        let selector = AuthFlowSelector::new(AuthEnvironment {
            interactive: true,
            phone_number: None,
        });
        let result = selector.select(&mut FakePrompt::with(&["2", "12345"]));
        assert!(matches!(result, Err(AuthError::InvalidPhoneNumber(5))));
    }

    #[test]
    fn qr_render_produces_output() {
        let image = render_qr("test payload").unwrap();
        assert!(!image.is_empty());
    }
}
