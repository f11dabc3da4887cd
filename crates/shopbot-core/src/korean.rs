//! Josa (particle) selection for message templates.

/// Particle pairs whose form depends on whether the preceding word ends in a
/// final consonant (batchim).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Particle {
    /// 은/는
    EunNeun,
    /// 이/가
    IGa,
    /// 을/를
    EulReul,
    /// 과/와
    GwaWa,
}

impl Particle {
    fn forms(self) -> (&'static str, &'static str) {
        match self {
            Self::EunNeun => ("은", "는"),
            Self::IGa => ("이", "가"),
            Self::EulReul => ("을", "를"),
            Self::GwaWa => ("과", "와"),
        }
    }

    /// The form to use after `word`.
    pub fn after(self, word: &str) -> &'static str {
        let (with_final, without_final) = self.forms();
        match last_char(word) {
            Some(c) if has_final_consonant(c) => with_final,
            _ => without_final,
        }
    }
}

/// `word` followed by the matching particle: `attach("사과", EulReul)` → `"사과를"`.
pub fn attach(word: &str, particle: Particle) -> String {
    format!("{word}{}", particle.after(word))
}

/// Last character that decides the particle, skipping trailing whitespace,
/// punctuation and closing brackets.
pub fn last_char(word: &str) -> Option<char> {
    word.chars()
        .rev()
        .find(|c| c.is_alphanumeric() || is_hangul_syllable(*c))
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Whether `c` is read with a final consonant. Hangul syllables are decoded
/// directly; digits and Latin letters use their Korean reading.
pub fn has_final_consonant(c: char) -> bool {
    if is_hangul_syllable(c) {
        return (u32::from(c) - 0xAC00) % 28 != 0;
    }
    match c.to_ascii_lowercase() {
        // 영, 일, 삼, 육, 칠, 팔
        '0' | '1' | '3' | '6' | '7' | '8' => true,
        'l' | 'm' | 'n' | 'r' => true,
        _ => false,
    }
}
