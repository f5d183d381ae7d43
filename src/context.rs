use std::sync::Arc;

use crate::analytics::Analytics;
use crate::chat::ChatClient;
use crate::i18n::Localizer;
use crate::settings::SettingsHandle;
use crate::store::Store;
use crate::timeparse::TimeResolver;

/// Collaborators shared by the scheduler, campaigns and reports.
#[derive(Clone)]
pub struct BotContext {
    pub chat: Arc<dyn ChatClient>,
    pub store: Arc<dyn Store>,
    pub analytics: Arc<dyn Analytics>,
    pub resolver: Arc<dyn TimeResolver>,
    pub localizer: Arc<Localizer>,
    pub settings: SettingsHandle,
}

impl BotContext {
    /// Localizes `key` in the current workspace language.
    pub fn text(&self, key: &str, args: &[(&str, &str)]) -> String {
        let language = self.settings.current().language.clone();
        self.localizer.localize(&language, key, args)
    }

    pub fn text_count(&self, key: &str, count: usize, args: &[(&str, &str)]) -> String {
        let language = self.settings.current().language.clone();
        self.localizer.localize_count(&language, key, count, args)
    }
}
