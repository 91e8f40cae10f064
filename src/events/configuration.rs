//! Builder collapsing intent toggles into configure messages

use super::session::{DialogueConfigureIntent, DialogueConfigureMessage};

/// Declarative batch of per-site intent toggles
///
/// Toggles are collapsed per `(site, intent)` with the last write winning,
/// then emitted as one message per site in order of first appearance. A
/// `None` site targets every site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueConfiguration {
    default_site_id: Option<String>,
    toggles: Vec<(Option<String>, String, bool)>,
}

impl DialogueConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Site used by toggles that don't name one
    pub fn for_site_id(mut self, site_id: impl Into<String>) -> Self {
        self.default_site_id = Some(site_id.into());
        self
    }

    pub fn enable_intent(self, intent_name: impl Into<String>) -> Self {
        let site = self.default_site_id.clone();
        self.toggle(site, intent_name.into(), true)
    }

    pub fn disable_intent(self, intent_name: impl Into<String>) -> Self {
        let site = self.default_site_id.clone();
        self.toggle(site, intent_name.into(), false)
    }

    pub fn enable_intents<I, S>(self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        intents
            .into_iter()
            .fold(self, |config, intent| config.enable_intent(intent))
    }

    pub fn disable_intents<I, S>(self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        intents
            .into_iter()
            .fold(self, |config, intent| config.disable_intent(intent))
    }

    /// Enable an intent on a given site, ignoring the default site
    pub fn enable_intent_on(
        self,
        site_id: impl Into<String>,
        intent_name: impl Into<String>,
    ) -> Self {
        self.toggle(Some(site_id.into()), intent_name.into(), true)
    }

    /// Disable an intent on a given site, ignoring the default site
    pub fn disable_intent_on(
        self,
        site_id: impl Into<String>,
        intent_name: impl Into<String>,
    ) -> Self {
        self.toggle(Some(site_id.into()), intent_name.into(), false)
    }

    fn toggle(mut self, site_id: Option<String>, intent_name: String, enable: bool) -> Self {
        self.toggles.push((site_id, intent_name, enable));
        self
    }

    pub fn build(&self) -> Vec<DialogueConfigureMessage> {
        let mut sites: Vec<(Option<String>, Vec<DialogueConfigureIntent>)> = Vec::new();

        for (site_id, intent_name, enable) in &self.toggles {
            let index = match sites.iter().position(|(site, _)| site == site_id) {
                Some(index) => index,
                None => {
                    sites.push((site_id.clone(), Vec::new()));
                    sites.len() - 1
                }
            };
            let intents = &mut sites[index].1;
            match intents.iter_mut().find(|i| &i.intent_id == intent_name) {
                Some(existing) => existing.enable = Some(*enable),
                None => intents.push(DialogueConfigureIntent {
                    intent_id: intent_name.clone(),
                    enable: Some(*enable),
                }),
            }
        }

        sites
            .into_iter()
            .map(|(site_id, intents)| DialogueConfigureMessage {
                site_id,
                intents: Some(intents),
            })
            .collect()
    }
}
