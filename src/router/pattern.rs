//! Route pattern classification and matching.
//!
//! Patterns are classified once at registration so matching never
//! re-parses them: a pattern with no parameter slots and no wildcard is
//! `Exact`, a pattern ending in `/*` matches every path under its prefix,
//! and anything with `:name` segments is matched segment-by-segment in
//! lockstep with the request path.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pattern {
    Exact(String),
    Params(Vec<Segment>),
    WildcardSuffix(String),
}

impl Pattern {
    pub(crate) fn parse(path: &str) -> Self {
        if let Some(prefix) = path.strip_suffix("/*") {
            return Pattern::WildcardSuffix(prefix.to_string());
        }
        if !path.contains(':') {
            return Pattern::Exact(path.to_string());
        }

        let segments = segments_of(path)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Pattern::Params(segments)
    }

    /// Parameter names in pattern order, for doc metadata.
    pub(crate) fn param_names(&self) -> Vec<&str> {
        match self {
            Pattern::Params(segments) => segments
                .iter()
                .filter_map(|segment| match segment {
                    Segment::Param(name) => Some(name.as_str()),
                    Segment::Literal(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn segments_of(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/')
}

/// A wildcard pattern matches every path beginning with `prefix + "/"`,
/// and the bare prefix itself.
#[inline]
pub(crate) fn wildcard_matches(prefix: &str, path: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}

/// Walks pattern and path segments in lockstep. Parameter slots always
/// match and capture; literals must be equal. Returns the captures on a
/// full match.
pub(crate) fn match_params(segments: &[Segment], path: &str) -> Option<Vec<(String, String)>> {
    let parts: Vec<&str> = segments_of(path).collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut captures = Vec::new();
    for (segment, part) in segments.iter().zip(&parts) {
        match segment {
            Segment::Literal(literal) => {
                if literal != part {
                    return None;
                }
            }
            Segment::Param(name) => captures.push((name.clone(), part.to_string())),
        }
    }
    Some(captures)
}

/// Number of literal segments before the first parameter slot; used to
/// pick the most specific parameterized pattern when several match.
#[inline]
pub(crate) fn leading_literals(segments: &[Segment]) -> usize {
    segments
        .iter()
        .take_while(|segment| matches!(segment, Segment::Literal(_)))
        .count()
}
