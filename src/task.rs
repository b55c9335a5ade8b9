/// One (model, prompt) pairing scheduled for exactly one inference attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskUnit {
    pub model: String,
    pub prompt: String,
}

/// Expands the cross-product in report order: models outer, prompts inner.
pub fn expand_tasks(models: &[String], prompts: &[String]) -> Vec<TaskUnit> {
    models
        .iter()
        .flat_map(|model| {
            prompts.iter().map(move |prompt| TaskUnit {
                model: model.clone(),
                prompt: prompt.clone(),
            })
        })
        .collect()
}
