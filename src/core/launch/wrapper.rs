// ─── Gamescope Wrapper ───
// Turns launch-option tokens into gamescope flags.

/// Launch option that asks for the game to run inside gamescope.
pub const GAMESCOPE_TOKEN: &str = "--gamescope";
pub const GAMESCOPE_BINARY: &str = "gamescope";

/// Result of translating launch options for the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperTranslation {
    /// Flags for gamescope itself, program name excluded, `--` excluded.
    pub wrapper_args: Vec<String>,
    /// Tokens left for the game, order preserved.
    pub remaining: Vec<String>,
}

pub fn wants_gamescope(tokens: &[String]) -> bool {
    tokens.iter().any(|token| token == GAMESCOPE_TOKEN)
}

/// Translate the recognised tokens into gamescope flags. The flag order is
/// fixed, independent of token order. Only the first `--width=`/`--height=`
/// is used, and every copy of a consumed token is dropped from the tail.
pub fn translate_gamescope(tokens: &[String], fps_limit: Option<u32>) -> WrapperTranslation {
    let mut wrapper_args = Vec::new();
    let mut consumed: Vec<&str> = vec![GAMESCOPE_TOKEN];

    for flag in ["--adaptive-sync", "--force-grab-cursor"] {
        if tokens.iter().any(|token| token == flag) {
            wrapper_args.push(flag.to_string());
            consumed.push(flag);
        }
    }

    for (prefix, short) in [("--width=", "-W"), ("--height=", "-H")] {
        let found = tokens
            .iter()
            .find_map(|token| token.strip_prefix(prefix).map(|value| (token.as_str(), value)));
        if let Some((token, value)) = found {
            if !value.is_empty() {
                wrapper_args.push(short.to_string());
                wrapper_args.push(value.to_string());
                consumed.push(token);
            }
        }
    }

    if tokens.iter().any(|token| token == "--fullscreen") {
        wrapper_args.push("-f".to_string());
        consumed.push("--fullscreen");
    }

    if tokens.iter().any(|token| token == "--bigpicture") {
        wrapper_args.push("-e".to_string());
        wrapper_args.push("-f".to_string());
        consumed.push("--bigpicture");
    }

    if let Some(fps) = fps_limit {
        wrapper_args.push("-r".to_string());
        wrapper_args.push(fps.to_string());
    }

    let remaining = tokens
        .iter()
        .filter(|token| !consumed.contains(&token.as_str()))
        .cloned()
        .collect();

    WrapperTranslation {
        wrapper_args,
        remaining,
    }
}
