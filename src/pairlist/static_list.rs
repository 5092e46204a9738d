use super::PairlistContext;

/// Configured whitelist, restricted to markets that exist and are active
#[derive(Debug, Clone)]
pub struct StaticPairList {
    whitelist: Vec<String>,
}

impl StaticPairList {
    pub fn new(whitelist: Vec<String>) -> Self {
        Self { whitelist }
    }

    pub fn generate(&self, ctx: &PairlistContext<'_>) -> Vec<String> {
        self.whitelist
            .iter()
            .filter(|pair| {
                let active = ctx.is_active(pair);
                if !active {
                    tracing::warn!(pair = %pair, "Whitelisted pair is not an active market, skipping");
                }
                active
            })
            .cloned()
            .collect()
    }
}
