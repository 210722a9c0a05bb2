//! Provider 工厂与选择策略
//!
//! ## 选择顺序
//! 1. 调用方显式指定的名称（不区分大小写），未注册的名称返回配置错误
//! 2. 配置中的 `AI_PROVIDER`
//! 3. 自动检测：GEMINI_API_KEY → GOOGLE_API_KEY → OPENAI_API_KEY → mock
//!
//! 真实 provider 构造失败时记录警告并换成 mock。

use std::collections::BTreeMap;

use phf::phf_map;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError};
use crate::models::question::ProviderDescriptor;
use crate::providers::{GeminiProvider, MockProvider, OpenAiProvider, Provider};

/// 各 provider 的默认模型
static DEFAULT_MODELS: phf::Map<&'static str, &'static str> = phf_map! {
    "openai" => "gpt-4",
    "gemini" => "gemini-1.5-flash",
    "mock" => "mock-model-v1",
};

/// 自动检测时依次查看的凭证变量
const AUTO_DETECT_ORDER: &[(&str, &str)] = &[
    ("GEMINI_API_KEY", "gemini"),
    ("GOOGLE_API_KEY", "gemini"),
    ("OPENAI_API_KEY", "openai"),
];

/// 构造 provider 时传入的参数
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub api_key: Option<String>,
    /// 已解析的模型名称；自定义 provider 没有默认模型时可能为空
    pub model: String,
}

pub type ProviderConstructor = fn(&Config, ProviderOptions) -> AppResult<Provider>;

struct RegistryEntry {
    name: String,
    credential_vars: Vec<String>,
    constructor: ProviderConstructor,
}

/// 名称 → 构造函数，按注册顺序保存
pub struct ProviderRegistry {
    entries: Vec<RegistryEntry>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// 内置的 openai / gemini / mock
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("openai", &["OPENAI_API_KEY"], build_openai);
        registry.register("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"], build_gemini);
        registry.register("mock", &[], build_mock);
        registry
    }

    /// 注册 provider，同名时覆盖原有构造函数
    ///
    /// `credential_vars` 是按优先级排列的凭证变量名。
    pub fn register(&mut self, name: &str, credential_vars: &[&str], constructor: ProviderConstructor) {
        let entry = RegistryEntry {
            name: name.to_lowercase(),
            credential_vars: credential_vars.iter().map(|v| v.to_string()).collect(),
            constructor,
        };

        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn get(&self, name: &str) -> Option<&RegistryEntry> {
        let name = name.to_lowercase();
        self.entries.iter().find(|e| e.name == name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn build_openai(config: &Config, options: ProviderOptions) -> AppResult<Provider> {
    let provider = OpenAiProvider::new(config, options.api_key.as_deref(), &options.model)?;
    Ok(Provider::text_only(provider))
}

fn build_gemini(config: &Config, options: ProviderOptions) -> AppResult<Provider> {
    let provider = GeminiProvider::new(config, options.api_key.as_deref(), &options.model)?;
    Ok(Provider::vision_capable(provider))
}

fn build_mock(_config: &Config, _options: ProviderOptions) -> AppResult<Provider> {
    Ok(Provider::text_only(MockProvider::new()))
}

/// 内置 provider 的默认模型
pub fn default_model(name: &str) -> Option<&'static str> {
    DEFAULT_MODELS.get(name.to_lowercase().as_str()).copied()
}

/// Provider 工厂
pub struct ProviderFactory {
    registry: ProviderRegistry,
    config: Config,
}

impl ProviderFactory {
    /// 使用内置注册表
    pub fn new(config: Config) -> Self {
        Self::with_registry(ProviderRegistry::with_builtin(), config)
    }

    pub fn with_registry(registry: ProviderRegistry, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// 根据已有凭证自动选择 provider
    pub fn detect_provider(&self) -> &'static str {
        AUTO_DETECT_ORDER
            .iter()
            .find(|(var, _)| self.config.credential(var).is_some())
            .map(|(_, name)| *name)
            .unwrap_or("mock")
    }

    /// 获取 provider
    ///
    /// # 参数
    /// - `name`: provider 名称，None 或 "auto" 表示使用配置 / 自动检测
    /// - `model`: 覆盖默认模型
    /// - `api_key`: 覆盖环境中的凭证
    ///
    /// # 返回
    /// 只有名称未注册时返回错误；其他构造失败都会退回 mock
    pub fn get_provider(
        &self,
        name: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> AppResult<Provider> {
        let requested = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.config.ai_provider.as_str())
            .to_lowercase();

        let resolved = if requested == "auto" {
            let detected = self.detect_provider();
            info!("🔎 自动检测 provider: {}", detected);
            detected.to_string()
        } else {
            requested
        };

        let entry = self.registry.get(&resolved).ok_or_else(|| ConfigError::UnknownProvider {
            name: resolved.clone(),
            available: self.registry.names().join(", "),
        })?;

        let options = ProviderOptions {
            api_key: self.resolve_api_key(entry, api_key),
            model: self.resolve_model(&entry.name, model),
        };
        let model_name = options.model.clone();

        match (entry.constructor)(&self.config, options) {
            Ok(provider) => {
                info!("🤖 使用 provider: {} (模型: {})", provider.provider_name(), model_name);
                Ok(provider)
            }
            Err(e) => {
                warn!("⚠️ 创建 provider '{}' 失败: {}，改用 mock", entry.name, e);
                Ok(Provider::text_only(MockProvider::new()))
            }
        }
    }

    /// 列出所有已注册 provider 的当前状态
    ///
    /// 每个 provider 都会临时构造一次，不发起网络请求。
    pub fn list_providers(&self) -> BTreeMap<String, ProviderDescriptor> {
        self.registry
            .entries
            .iter()
            .map(|entry| {
                let api_key = self.resolve_api_key(entry, None);
                let has_api_key = api_key.is_some();
                let options = ProviderOptions {
                    api_key,
                    model: self.resolve_model(&entry.name, None),
                };

                let descriptor = match (entry.constructor)(&self.config, options) {
                    Ok(provider) => provider.descriptor(has_api_key),
                    Err(e) => ProviderDescriptor {
                        provider_name: entry.name.clone(),
                        is_available: false,
                        supported_models: Vec::new(),
                        has_api_key,
                        supports_documents: false,
                        error: Some(e.to_string()),
                    },
                };
                (entry.name.clone(), descriptor)
            })
            .collect()
    }

    /// 调用方参数 > 配置 AI_MODEL > 默认模型
    fn resolve_model(&self, name: &str, model: Option<&str>) -> String {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(self.config.ai_model.as_deref())
            .or_else(|| default_model(name))
            .unwrap_or_default()
            .to_string()
    }

    /// 调用方参数 > 环境中的凭证变量（按注册顺序）
    fn resolve_api_key(&self, entry: &RegistryEntry, api_key: Option<&str>) -> Option<String> {
        api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                entry
                    .credential_vars
                    .iter()
                    .find_map(|var| self.config.credential(var))
            })
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn factory(credentials: &[(&str, &str)]) -> ProviderFactory {
        let config = credentials
            .iter()
            .fold(Config::default(), |config, (var, value)| {
                config.with_credential(*var, *value)
            });
        ProviderFactory::new(config)
    }

    #[test]
    fn test_auto_detect_priority() {
        assert_eq!(factory(&[]).detect_provider(), "mock");
        assert_eq!(factory(&[("GEMINI_API_KEY", "g")]).detect_provider(), "gemini");
        assert_eq!(factory(&[("GOOGLE_API_KEY", "g")]).detect_provider(), "gemini");
        assert_eq!(factory(&[("OPENAI_API_KEY", "o")]).detect_provider(), "openai");
        assert_eq!(
            factory(&[("OPENAI_API_KEY", "o"), ("GEMINI_API_KEY", "g")]).detect_provider(),
            "gemini"
        );
    }

    #[test]
    fn test_auto_provider_kinds() {
        let provider = factory(&[]).get_provider(None, None, None).unwrap();
        assert_eq!(provider.provider_name(), "Mock Provider");

        let provider = factory(&[("GEMINI_API_KEY", "g"), ("OPENAI_API_KEY", "o")])
            .get_provider(Some("auto"), None, None)
            .unwrap();
        assert_eq!(provider.provider_name(), "Google Gemini");
        assert!(provider.supports_documents());
        assert!(provider.is_available());
    }

    #[test]
    fn test_explicit_name_is_case_insensitive() {
        let provider = factory(&[]).get_provider(Some("OpenAI"), None, Some("sk-test")).unwrap();
        assert_eq!(provider.provider_name(), "OpenAI");
        assert!(provider.is_available());
        assert!(provider.document_solver().is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let err = factory(&[]).get_provider(Some("claude"), None, None).unwrap_err();
        assert!(err.is_validation());
        assert!(matches!(err, AppError::Config(ConfigError::UnknownProvider { .. })));
        assert!(err.to_string().contains("openai, gemini, mock"));
    }

    #[test]
    fn test_construction_failure_falls_back_to_mock() {
        let config = Config {
            openai_api_base_url: "not a url".to_string(),
            ..Config::default()
        };
        let provider = ProviderFactory::new(config)
            .get_provider(Some("openai"), None, Some("sk-test"))
            .unwrap();
        assert_eq!(provider.provider_name(), "Mock Provider");
    }

    #[test]
    fn test_model_resolution() {
        let f = factory(&[]);
        assert_eq!(f.resolve_model("gemini", None), "gemini-1.5-flash");
        assert_eq!(f.resolve_model("openai", Some("gpt-4-turbo")), "gpt-4-turbo");

        let f = ProviderFactory::new(Config::default().with_model("gpt-3.5-turbo"));
        assert_eq!(f.resolve_model("openai", None), "gpt-3.5-turbo");
        assert_eq!(f.resolve_model("openai", Some("gpt-4")), "gpt-4");
    }

    #[test]
    fn test_list_providers() {
        let listing = factory(&[("GOOGLE_API_KEY", "g")]).list_providers();

        assert_eq!(listing.len(), 3);
        assert!(listing["gemini"].has_api_key);
        assert!(listing["gemini"].is_available);
        assert!(listing["gemini"].supports_documents);
        assert!(!listing["openai"].has_api_key);
        assert!(!listing["openai"].is_available);
        assert!(listing["mock"].is_available);
        assert_eq!(listing["mock"].supported_models, vec!["mock-model-v1", "mock-model-v2"]);
    }

    #[test]
    fn test_registry_is_extensible() {
        fn build_custom(_config: &Config, _options: ProviderOptions) -> AppResult<Provider> {
            Ok(Provider::text_only(MockProvider::new()))
        }

        let mut f = factory(&[]);
        f.registry_mut().register("Local", &["LOCAL_API_KEY"], build_custom);

        assert!(f.registry().contains("local"));
        assert!(f.get_provider(Some("local"), None, None).is_ok());
        assert_eq!(f.list_providers().len(), 4);
    }
}
