/// Number of characters of an ignored name that must be shared with an author.
pub fn fragment_length(name_len: usize) -> usize {
    let len = name_len as f64;
    if name_len >= 8 {
        (len * 0.7).floor() as usize
    } else {
        (len * 0.75).round() as usize
    }
}

pub fn matches(author: &str, ignored_user: &str) -> bool {
    let author = author.to_lowercase();
    let user: Vec<char> = ignored_user.to_lowercase().chars().collect();
    let author_len = author.chars().count();
    if author_len == 0 {
        return false;
    }

    let fragment = fragment_length(user.len());
    let prefix: String = user[..fragment].iter().collect();
    let suffix: String = user[user.len() - fragment..].iter().collect();

    (author.starts_with(&prefix) || author.ends_with(&suffix))
        && fragment as f64 / author_len as f64 > 0.5
}

pub fn is_ignored<S: AsRef<str>>(author: &str, ignored_users: &[S]) -> bool {
    ignored_users
        .iter()
        .any(|user| matches(author, user.as_ref()))
}
