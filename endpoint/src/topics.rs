/*
The monitor only knows logical topic keys. This side owns the mapping to the topic
names its message store uses, so either side can rename topics without the other
needing to know.
*/

use std::collections::BTreeMap;

use runtime_relay_net::{
    contracts::v1::{requests::TopicKeys, responses::TopicMapping},
    data_types::{TopicKey, TopicName},
};

pub struct TopicResolver {
    mapping: BTreeMap<TopicKey, TopicName>,
}

impl TopicResolver {
    pub fn new(mapping: BTreeMap<TopicKey, TopicName>) -> Self {
        Self { mapping }
    }

    /// An empty configured name counts as not configured, it may not have propagated yet
    pub fn resolve(self: &Self, key: &str) -> Option<&TopicName> {
        self.mapping.get(key).filter(|name| !name.trim().is_empty())
    }

    /// Keys without configuration are left out of the result rather than failing
    pub fn resolve_all(self: &Self, keys: &TopicKeys) -> TopicMapping {
        keys.iter()
            .filter_map(|key| self.resolve(key).map(|name| (key.clone(), name.clone())))
            .collect()
    }

    pub fn topic_names(self: &Self) -> Vec<&TopicName> {
        self.mapping.values().filter(|name| !name.trim().is_empty()).collect()
    }
}
