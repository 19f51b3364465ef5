use crate::comments::CommentId;

pub const SEPARATOR: char = ';';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid comment id token {0:?}")]
    InvalidToken(String),
    #[error("comment id delta {delta} overflows base {base}")]
    Overflow { base: CommentId, delta: i64 },
}

pub fn encode(ids: &[CommentId]) -> String {
    let Some((&first, rest)) = ids.split_first() else {
        return String::new();
    };

    let mut out = first.to_string();
    for id in rest {
        out.push(SEPARATOR);
        out.push_str(&id.wrapping_sub(first).to_string());
    }
    out
}

pub fn decode(data: &str) -> Result<Vec<CommentId>, CodecError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = data.split(SEPARATOR);
    let first = match tokens.next() {
        Some(token) => parse_token(token)?,
        None => return Ok(Vec::new()),
    };

    let mut ids = vec![first];
    for token in tokens {
        let delta = parse_token(token)?;
        let id = first
            .checked_add(delta)
            .ok_or(CodecError::Overflow { base: first, delta })?;
        ids.push(id);
    }
    Ok(ids)
}

fn parse_token(token: &str) -> Result<i64, CodecError> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| CodecError::InvalidToken(token.to_string()))
}
