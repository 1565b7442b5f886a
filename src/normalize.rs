// 🔤 Name Normalization - Canonical Join Keys
// Turns inconsistently spelled area names into stable keys both sources agree on

/// Canonicalize a free-text area name into a join key.
///
/// The price index and the income survey spell the same areas differently
/// ("Kensington & Chelsea", "kensington and chelsea", "KENSINGTON-AND-CHELSEA").
/// This is the sole mechanism that makes the two datasets joinable, so the
/// steps run in a fixed order:
///
/// 1. lowercase and trim
/// 2. `&` becomes `and`
/// 3. apostrophes and curly quotes vanish (no space left behind)
/// 4. any other character outside `[a-z0-9]` becomes a space
/// 5. whitespace runs collapse to a single space, ends trimmed
///
/// Total (never fails) and idempotent. The result is used only for joining,
/// never displayed.
///
/// # Example
///
/// ```
/// use housing_affordability::normalize::normalize_area;
///
/// assert_eq!(normalize_area("Kensington & Chelsea"), "kensington and chelsea");
/// assert_eq!(normalize_area("King's Cross"), "kings cross");
/// ```
pub fn normalize_area(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let anded = lowered.trim().replace('&', "and");

    let mut cleaned = String::with_capacity(anded.len());
    for c in anded.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// TESTS
// ============================================================================
