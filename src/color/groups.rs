//! Static color tables: perceptual groups and grammatical gender folding.

/// Groups of canonical colors that shoppers perceive as "the same" color.
///
/// Membership decides similarity before any embedding fallback runs.
pub const SIMILAR_COLOR_GROUPS: &[&[&str]] = &[
    &["BEIGE", "MARRON"],     // earth tones
    &["AZUL", "TURQUESA"],    // blues
    &["ROSA", "MORADO"],      // pinks and violets
    &["GRIS", "PLATEADO"],    // grays
    &["AMARILLO", "DORADO"],  // yellows and golds
];

/// Fold grammatical gender in Spanish color names.
///
/// The attribute classifier emits colors in masculine form (NEGRO, BLANCO)
/// while catalogs often store the feminine spelling of the same concept
/// (NEGRA, BLANCA). Input is uppercased; unknown colors pass through.
pub fn normalize_gender(color: &str) -> String {
    let upper = color.trim().to_uppercase();
    match upper.as_str() {
        "NEGRA" => "NEGRO",
        "BLANCA" => "BLANCO",
        "ROJA" => "ROJO",
        "AMARILLA" => "AMARILLO",
        "MORADA" => "MORADO",
        "DORADA" => "DORADO",
        "PLATEADA" => "PLATEADO",
        "BRONCEADA" => "BRONCEADO",
        _ => return upper,
    }
    .to_string()
}

/// Find the perceptual group containing both colors, if any.
pub fn shared_perceptual_group(a: &str, b: &str) -> Option<&'static [&'static str]> {
    SIMILAR_COLOR_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&a) && group.contains(&b))
}

/// Find the perceptual group a canonical color belongs to, if any.
pub fn perceptual_group_of(color: &str) -> Option<&'static [&'static str]> {
    SIMILAR_COLOR_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&color))
}

/// Canonical name of a group: its lexicographically first member.
pub fn group_name(group: &[&str]) -> String {
    let mut members: Vec<&str> = group.to_vec();
    members.sort_unstable();
    members.first().copied().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_gender_feminine_to_masculine() {
        assert_eq!(normalize_gender("NEGRA"), "NEGRO");
        assert_eq!(normalize_gender("blanca"), "BLANCO");
        assert_eq!(normalize_gender("Dorada"), "DORADO");
    }

    #[test]
    fn test_normalize_gender_invariants_pass_through() {
        assert_eq!(normalize_gender("VERDE"), "VERDE");
        assert_eq!(normalize_gender("AZUL"), "AZUL");
        assert_eq!(normalize_gender("celeste"), "CELESTE");
    }

    #[test]
    fn test_shared_perceptual_group() {
        assert!(shared_perceptual_group("BEIGE", "MARRON").is_some());
        assert!(shared_perceptual_group("BEIGE", "NEGRO").is_none());
    }

    #[test]
    fn test_group_name_is_sorted_first_member() {
        assert_eq!(group_name(&["MARRON", "BEIGE"]), "BEIGE");
        assert_eq!(group_name(&["AZUL", "TURQUESA"]), "AZUL");
    }
}
