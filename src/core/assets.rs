//! Compile-time embedded game assets.
//!
//! The world seed is baked into the binary so a new game never needs files
//! next to the executable.

/// Embeds files from `assets/` as text.
///
/// Generates a public constant per file plus `get_embedded_asset(path)` and
/// `list_assets()` for lookup.
macro_rules! embedded_assets {
    ($($path:expr => $const_name:ident),* $(,)?) => {
        $(
            pub const $const_name: &str =
                include_str!(concat!("../../assets/", $path));
        )*

        pub fn get_embedded_asset(path: &str) -> Option<&'static str> {
            match path {
                $( $path => Some($const_name), )*
                _ => None,
            }
        }

        pub fn list_assets() -> Vec<String> {
            vec![ $( $path.to_string(), )* ]
        }
    };
}

embedded_assets! {
    "world.sql" => WORLD_SEED_SQL,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_seed_is_embedded() {
        assert!(WORLD_SEED_SQL.contains("CREATE TABLE Hints"));
        assert_eq!(get_embedded_asset("world.sql"), Some(WORLD_SEED_SQL));
        assert!(get_embedded_asset("missing.sql").is_none());
        assert_eq!(list_assets(), vec!["world.sql".to_string()]);
    }
}
