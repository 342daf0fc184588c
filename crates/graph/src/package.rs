use codestack_code_chunker::Language;

/// Package a raw external module string belongs to.
///
/// `@company/auth-service/lib/auth` -> `@company/auth-service`,
/// `lodash/map` -> `lodash`, `os.path` -> `os`, `serde::de` -> `serde`,
/// `github.com/org/repo/pkg` -> `github.com/org/repo`.
#[must_use]
pub fn package_name(language: Language, module: &str) -> String {
    let module = module.trim().trim_matches(|c| c == '"' || c == '\'');

    match language {
        Language::Python => module.trim_start_matches('.').split('.').next().unwrap_or(module).to_string(),
        Language::Rust => module.split("::").next().unwrap_or(module).trim().to_string(),
        Language::Go => {
            let parts: Vec<&str> = module.split('/').collect();
            if parts.first().is_some_and(|host| host.contains('.')) {
                parts.iter().take(3).copied().collect::<Vec<_>>().join("/")
            } else {
                parts.first().copied().unwrap_or(module).to_string()
            }
        }
        Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => {
            let parts: Vec<&str> = module.split('.').collect();
            parts.iter().take(2).copied().collect::<Vec<_>>().join(".")
        }
        Language::C | Language::Cpp => module.to_string(),
        _ => slash_package(module),
    }
}

fn slash_package(module: &str) -> String {
    let mut parts = module.split('/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
        (Some(first), _) => first.to_string(),
        (None, _) => module.to_string(),
    }
}
