//! One [`LanguageKit`](crate::kit::LanguageKit) implementation per supported
//! language binding.

pub mod applescript;
pub mod html;
pub mod javascript;
pub mod powershell;
pub mod python;
pub mod r;
pub mod shell;
