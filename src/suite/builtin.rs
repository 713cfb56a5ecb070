const FUNKWHALE: &str = include_str!("../../suites/funkwhale.yaml");
const FUNKWHALE_FRONTEND: &str = include_str!("../../suites/funkwhale-frontend.yaml");

const BUILTINS: &[(&str, &str)] = &[
    ("funkwhale", FUNKWHALE),
    ("funkwhale-frontend", FUNKWHALE_FRONTEND),
];

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

pub fn builtin_source(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, source)| *source)
}
