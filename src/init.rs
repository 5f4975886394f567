//! Shell initialization scripts printed by `komplete init`.

pub const ZSH_SCRIPT: &str = include_str!("../shell/komplete.zsh");

pub fn zsh_script() -> &'static str {
    ZSH_SCRIPT
}

pub fn alias_script() -> &'static str {
    "alias k=komplete"
}
