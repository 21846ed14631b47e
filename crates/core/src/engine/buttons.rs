use std::collections::HashMap;

use followspot_fixtures::FixtureSet;

use crate::input::InputSource;
use crate::settings::{ActionMode, ActionType, ButtonAction};

/// Edge-triggers configured button → fixture actions, independent of motion.
///
/// Edge state is per-process and per-button: each referenced button is read
/// once per tick and compared against its previous state, so several actions
/// bound to the same button all see the same edge. Unknown target ids are
/// ignored; when several actions touch the same fixture, the last one in
/// configured order wins for the tick.
#[derive(Debug, Default)]
pub struct ButtonActionEngine {
    prev: HashMap<usize, bool>,
}

impl ButtonActionEngine {
    pub fn new() -> Self {
        ButtonActionEngine::default()
    }

    /// Process one tick of button actions against the fixture set. Returns
    /// true if any fixture's enabled flag changed.
    pub fn process(
        &mut self,
        source: &mut dyn InputSource,
        actions: &[ButtonAction],
        fixtures: &mut FixtureSet,
    ) -> bool {
        // One read per referenced button, shared by every action on it.
        let mut current: HashMap<usize, bool> = HashMap::new();
        for action in actions {
            current
                .entry(action.button)
                .or_insert_with(|| source.button(action.button));
        }

        let mut changed = false;
        for action in actions {
            let cur = current[&action.button];
            let prev = self.prev.get(&action.button).copied().unwrap_or(false);

            if cur && !prev {
                changed |= Self::on_press(action, fixtures);
            }
            if !cur && prev && action.mode == ActionMode::Hold {
                changed |= Self::on_release(action, fixtures);
            }
        }

        for (button, state) in current {
            self.prev.insert(button, state);
        }
        changed
    }

    fn on_press(action: &ButtonAction, fixtures: &mut FixtureSet) -> bool {
        let mut changed = false;
        for id in &action.targets {
            let result = match (action.mode, action.action) {
                (ActionMode::Toggle, ActionType::ToggleFixture)
                | (ActionMode::Toggle, ActionType::ToggleGroup) => {
                    match fixtures.toggle(id) {
                        Some(enabled) => {
                            log::info!(
                                "fixture toggled ({}): {}",
                                if enabled { "EN" } else { "DIS" },
                                id
                            );
                            true
                        }
                        None => false,
                    }
                }
                (ActionMode::Toggle, ActionType::EnableFixture)
                | (ActionMode::Hold, ActionType::ToggleFixture)
                | (ActionMode::Hold, ActionType::EnableFixture)
                | (ActionMode::Hold, ActionType::ToggleGroup) => {
                    Self::set_enabled(fixtures, id, true)
                }
                (_, ActionType::DisableFixture) => Self::set_enabled(fixtures, id, false),
            };
            changed |= result;
        }
        changed
    }

    /// Falling edge of a hold action releases what the press engaged.
    /// `disable_fixture` only fires on the press.
    fn on_release(action: &ButtonAction, fixtures: &mut FixtureSet) -> bool {
        if action.action == ActionType::DisableFixture {
            return false;
        }
        let mut changed = false;
        for id in &action.targets {
            changed |= Self::set_enabled(fixtures, id, false);
        }
        changed
    }

    fn set_enabled(fixtures: &mut FixtureSet, id: &str, enabled: bool) -> bool {
        let changed = fixtures.set_enabled(id, enabled);
        if changed {
            log::info!(
                "fixture {}: {}",
                if enabled { "ENABLED" } else { "DISABLED" },
                id
            );
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SourceInfo;
    use followspot_fixtures::Fixture;

    struct Buttons {
        pressed: Vec<usize>,
    }

    impl InputSource for Buttons {
        fn info(&self) -> SourceInfo {
            SourceInfo::default()
        }
        fn axis(&mut self, _index: i32) -> f32 {
            0.0
        }
        fn button(&mut self, index: usize) -> bool {
            self.pressed.contains(&index)
        }
    }

    fn fixtures(ids: &[&str]) -> FixtureSet {
        let mut set = FixtureSet::default();
        for id in ids {
            set.add(Fixture::new(id)).unwrap();
        }
        set
    }

    fn toggle_action(button: usize, targets: &[&str]) -> ButtonAction {
        ButtonAction {
            button,
            mode: ActionMode::Toggle,
            action: ActionType::ToggleFixture,
            targets: targets.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn toggle_fires_on_rising_edge_only() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["Left"]);
        let actions = vec![toggle_action(7, &["Left"])];

        let mut down = Buttons { pressed: vec![7] };
        assert!(engine.process(&mut down, &actions, &mut set));
        assert!(!set.get("Left").unwrap().enabled);

        // still held: no second toggle
        assert!(!engine.process(&mut down, &actions, &mut set));
        assert!(!set.get("Left").unwrap().enabled);

        let mut up = Buttons { pressed: vec![] };
        assert!(!engine.process(&mut up, &actions, &mut set));

        // next press toggles back on
        assert!(engine.process(&mut down, &actions, &mut set));
        assert!(set.get("Left").unwrap().enabled);
    }

    #[test]
    fn hold_enables_on_press_and_disables_on_release() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["Spot"]);
        set.set_enabled("Spot", false);
        let actions = vec![ButtonAction {
            button: 2,
            mode: ActionMode::Hold,
            action: ActionType::EnableFixture,
            targets: vec!["Spot".to_string()],
        }];

        let mut down = Buttons { pressed: vec![2] };
        engine.process(&mut down, &actions, &mut set);
        assert!(set.get("Spot").unwrap().enabled);

        let mut up = Buttons { pressed: vec![] };
        engine.process(&mut up, &actions, &mut set);
        assert!(!set.get("Spot").unwrap().enabled);
    }

    #[test]
    fn hold_disable_does_not_reenable_on_release() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["Spot"]);
        let actions = vec![ButtonAction {
            button: 2,
            mode: ActionMode::Hold,
            action: ActionType::DisableFixture,
            targets: vec!["Spot".to_string()],
        }];

        let mut down = Buttons { pressed: vec![2] };
        engine.process(&mut down, &actions, &mut set);
        assert!(!set.get("Spot").unwrap().enabled);

        let mut up = Buttons { pressed: vec![] };
        engine.process(&mut up, &actions, &mut set);
        assert!(!set.get("Spot").unwrap().enabled);
    }

    #[test]
    fn unknown_targets_are_ignored() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["Left"]);
        let actions = vec![toggle_action(1, &["Ghost"])];
        let mut down = Buttons { pressed: vec![1] };
        assert!(!engine.process(&mut down, &actions, &mut set));
        assert!(set.get("Left").unwrap().enabled);
    }

    #[test]
    fn last_action_in_order_wins_for_shared_fixture() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["Left"]);
        let actions = vec![
            ButtonAction {
                button: 1,
                mode: ActionMode::Toggle,
                action: ActionType::EnableFixture,
                targets: vec!["Left".to_string()],
            },
            ButtonAction {
                button: 1,
                mode: ActionMode::Toggle,
                action: ActionType::DisableFixture,
                targets: vec!["Left".to_string()],
            },
        ];
        let mut down = Buttons { pressed: vec![1] };
        engine.process(&mut down, &actions, &mut set);
        assert!(!set.get("Left").unwrap().enabled);
    }

    #[test]
    fn actions_sharing_a_button_both_see_the_edge() {
        let mut engine = ButtonActionEngine::new();
        let mut set = fixtures(&["A", "B"]);
        let actions = vec![toggle_action(4, &["A"]), toggle_action(4, &["B"])];
        let mut down = Buttons { pressed: vec![4] };
        engine.process(&mut down, &actions, &mut set);
        assert!(!set.get("A").unwrap().enabled);
        assert!(!set.get("B").unwrap().enabled);
    }
}
