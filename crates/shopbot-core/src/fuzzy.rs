//! Item-name resolution: exact, then substring containment, then similarity.
//!
//! A substring hit always beats a similarity hit. Within a tier the highest
//! score wins; equal scores go to the longer common substring, then to the
//! earlier candidate.

/// Minimum similarity ratio for the last tier.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Lowercase and drop all whitespace.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    Exact,
    Substring,
    Similar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub index: usize,
    pub kind: MatchKind,
    pub score: f64,
}

/// Pick the best candidate for `query`, returning its index in `candidates`.
pub fn resolve<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<Match> {
    let q = normalize(query);
    if q.is_empty() {
        return None;
    }
    let normalized: Vec<Vec<char>> = candidates
        .iter()
        .map(|c| normalize(c.as_ref()).chars().collect())
        .collect();
    let qc: Vec<char> = q.chars().collect();

    if let Some(index) = normalized.iter().position(|c| *c == qc) {
        return Some(Match {
            index,
            kind: MatchKind::Exact,
            score: 1.0,
        });
    }

    let substring = normalized
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_empty() && contains(c, &qc))
        .map(|(i, c)| (i, qc.len() as f64 / c.len() as f64));
    if let Some(m) = best(substring, &qc, &normalized, MatchKind::Substring) {
        return Some(m);
    }

    let similar = normalized
        .iter()
        .enumerate()
        .map(|(i, c)| (i, similarity_ratio(&qc, c)))
        .filter(|(_, score)| *score > SIMILARITY_THRESHOLD);
    best(similar, &qc, &normalized, MatchKind::Similar)
}

fn best(
    scored: impl Iterator<Item = (usize, f64)>,
    query: &[char],
    normalized: &[Vec<char>],
    kind: MatchKind,
) -> Option<Match> {
    let mut winner: Option<(usize, f64, usize)> = None;
    for (index, score) in scored {
        let lcs = longest_common_substring(query, &normalized[index]);
        let better = match winner {
            None => true,
            Some((_, s, l)) => score > s || (score == s && lcs > l),
        };
        if better {
            winner = Some((index, score, lcs));
        }
    }
    winner.map(|(index, score, _)| Match { index, kind, score })
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Length of the longest run of characters shared by `a` and `b`.
pub fn longest_common_substring(a: &[char], b: &[char]) -> usize {
    longest_block(a, b, 0..a.len(), 0..b.len()).2
}

/// Longest matching block within the given ranges as `(start_a, start_b, len)`.
fn longest_block(
    a: &[char],
    b: &[char],
    ra: std::ops::Range<usize>,
    rb: std::ops::Range<usize>,
) -> (usize, usize, usize) {
    let mut best = (ra.start, rb.start, 0);
    let mut prev = vec![0usize; rb.len() + 1];
    for i in ra.clone() {
        let mut cur = vec![0usize; rb.len() + 1];
        for (jj, j) in rb.clone().enumerate() {
            if a[i] == b[j] {
                cur[jj + 1] = prev[jj] + 1;
                if cur[jj + 1] > best.2 {
                    best = (i + 1 - cur[jj + 1], j + 1 - cur[jj + 1], cur[jj + 1]);
                }
            }
        }
        prev = cur;
    }
    best
}

fn matching_chars(
    a: &[char],
    b: &[char],
    ra: std::ops::Range<usize>,
    rb: std::ops::Range<usize>,
) -> usize {
    if ra.is_empty() || rb.is_empty() {
        return 0;
    }
    let (i, j, len) = longest_block(a, b, ra.clone(), rb.clone());
    if len == 0 {
        return 0;
    }
    len + matching_chars(a, b, ra.start..i, rb.start..j)
        + matching_chars(a, b, i + len..ra.end, j + len..rb.end)
}

/// Ratcliff/Obershelp ratio: `2 * matches / (len(a) + len(b))`.
pub fn similarity_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let m = matching_chars(a, b, 0..a.len(), 0..b.len());
    2.0 * m as f64 / total as f64
}
