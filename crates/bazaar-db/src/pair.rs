/// Order two user ids so a symmetric relation has a single storage key,
/// whichever participant the request came from.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}
