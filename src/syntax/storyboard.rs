//! The storyboard root: Init block, stories and the global stop trigger

use crate::catalog::CatalogCache;
use crate::error::{Error, Result};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::syntax::actions::Action;
use crate::syntax::story::Story;
use crate::syntax::triggers::Trigger;
use crate::syntax::Context;

/// The Init block: private actions applied once before any story starts
#[derive(Debug)]
pub struct Init {
    privates: Vec<(String, Vec<Action>)>,
}

impl Init {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let actions = node.required_child("Actions")?;
        let mut privates = Vec::new();
        for child in actions.all_children() {
            match child.name() {
                "Private" => {
                    let entity_ref = child.required_attribute("entityRef")?.to_string();
                    let mut entity_actions = Vec::new();
                    for private_action in child.children("PrivateAction") {
                        entity_actions.push(Action::from_private_xml(
                            String::new(),
                            private_action,
                            scope,
                        )?);
                    }
                    privates.push((entity_ref, entity_actions));
                }
                other => return Err(Error::unsupported_element(other, "Init")),
            }
        }
        Ok(Init { privates })
    }

    /// Apply every init action instantaneously
    pub fn run(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        for (entity_ref, actions) in &mut self.privates {
            let actors = [entity_ref.clone()];
            for action in actions {
                action.apply_init(ctx, &actors)?;
            }
        }
        Ok(())
    }
}

/// The storyboard: Init plus stories plus the global stop trigger
#[derive(Debug)]
pub struct Storyboard {
    init: Init,
    stories: Vec<Story>,
    stop_trigger: Trigger,
    init_done: bool,
}

impl Storyboard {
    pub fn from_xml(node: &XmlNode, scope: &Scope, catalogs: &mut CatalogCache) -> Result<Self> {
        let init = Init::from_xml(node.required_child("Init")?, scope)?;
        let mut stories = Vec::new();
        for story in node.children("Story") {
            stories.push(Story::from_xml(story, scope, catalogs)?);
        }
        let stop_trigger = node
            .child("StopTrigger")
            .map(|trigger| Trigger::from_xml(trigger, scope))
            .transpose()?
            .unwrap_or_default();
        Ok(Storyboard {
            init,
            stories,
            stop_trigger,
            init_done: false,
        })
    }

    /// Advance the storyboard one tick. Returns true when evaluation is
    /// finished: the global stop trigger fired or every story completed.
    pub fn evaluate(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        if self.stop_trigger.evaluate(ctx)? {
            tracing::info!("storyboard stop trigger fired");
            return Ok(true);
        }
        if !self.init_done {
            self.init.run(ctx)?;
            self.init_done = true;
            return Ok(false);
        }
        for story in &mut self.stories {
            story.step(ctx)?;
        }
        if !self.stories.is_empty()
            && self.stories.iter().all(|story| story.state().is_complete())
        {
            tracing::info!("all stories complete");
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml::parse_document;

    #[test]
    fn storyboard_requires_init() {
        let node = parse_document("<Storyboard/>").unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let mut catalogs = CatalogCache::new();
        let err = Storyboard::from_xml(&node, &scope, &mut catalogs).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn init_global_actions_are_rejected() {
        let node = parse_document(
            r#"<Storyboard>
                 <Init>
                   <Actions>
                     <GlobalAction><EnvironmentAction/></GlobalAction>
                   </Actions>
                 </Init>
               </Storyboard>"#,
        )
        .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let mut catalogs = CatalogCache::new();
        let err = Storyboard::from_xml(&node, &scope, &mut catalogs).unwrap_err();
        assert!(matches!(err, Error::UnsupportedElement { .. }));
    }
}
