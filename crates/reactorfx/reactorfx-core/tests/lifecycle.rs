use std::cell::Cell;
use std::rc::Rc;

use reactorfx_core::{
    AnimationStrategy, BindingState, NexusConfig, NexusError, RuntimeNexus, Scope, StrategyId,
};
use reactorfx_test_fixtures::host::FakeHost;

fn counting(
    selector: &str,
    main: &str,
    thresholds: Vec<f32>,
) -> (AnimationStrategy, Rc<Cell<u32>>) {
    let enters = Rc::new(Cell::new(0));
    let hits = enters.clone();
    let strategy = AnimationStrategy::new(selector, main, format!("{main}-in"), thresholds)
        .on_enter(move |_| hits.set(hits.get() + 1));
    (strategy, enters)
}

fn ids(nexus: &RuntimeNexus) -> Vec<StrategyId> {
    nexus.get_strategies().into_iter().map(|(id, _)| id).collect()
}

#[test]
fn pause_then_resume_restores_observation() {
    let dom = FakeHost::new();
    let (a, _) = counting(".a", "a", vec![0.5]);
    let (b, _) = counting(".b", "b", vec![0.1]);
    let mut nexus = RuntimeNexus::new(vec![a, b], dom.host(), NexusConfig::default()).unwrap();
    let (a, b) = match ids(&nexus)[..] {
        [a, b] => (a, b),
        _ => panic!("expected two strategies"),
    };
    let e1 = dom.element("div", &["a"]);
    let e2 = dom.element("div", &["a", "b"]);
    let e3 = dom.element("div", &["b"]);
    nexus.add_elements(&[e1, e2, e3], None).unwrap();
    let before_a = nexus.observed_elements(a);
    let before_b = nexus.observed_elements(b);
    assert_eq!(before_a, vec![e1, e2]);

    nexus.pause(&Scope::strategies([a])).unwrap();
    nexus.pause(&Scope::strategies([a])).unwrap();
    assert!(nexus.observed_elements(a).is_empty());
    assert_eq!(nexus.binding_state(e1, a), Some(BindingState::Paused));
    assert_eq!(nexus.binding_state(e2, b), Some(BindingState::Observed));
    assert_eq!(dom.watchers_observing(e1), 0);
    assert_eq!(dom.watchers_observing(e2), 1);
    assert_eq!(nexus.observed_elements(b), before_b);

    nexus.resume(&Scope::strategies([a])).unwrap();
    assert_eq!(nexus.observed_elements(a), before_a);
    assert_eq!(nexus.observed_elements(b), before_b);
    assert_eq!(nexus.binding_state(e1, a), Some(BindingState::Observed));
    assert_eq!(dom.watchers_observing(e2), 2);
}

#[test]
fn pause_all_stops_every_watcher_membership() {
    let dom = FakeHost::new();
    let (a, enters) = counting(".a", "a", vec![0.5]);
    let mut nexus = RuntimeNexus::new(vec![a], dom.host(), NexusConfig::default()).unwrap();
    let el = dom.element("div", &["a"]);
    nexus.add_elements(&[el], None).unwrap();

    nexus.pause(&Scope::all()).unwrap();
    dom.emit(el, 0.9);
    assert_eq!(enters.get(), 0);
    assert_eq!(nexus.elements(), vec![el]);

    nexus.resume(&Scope::all()).unwrap();
    dom.emit(el, 0.9);
    assert_eq!(enters.get(), 1);
}

#[test]
fn pausing_one_strategy_on_a_shared_sentinel() {
    let dom = FakeHost::new();
    let (cards, card_enters) = counting(".card", "rfx", vec![0.5]);
    let (divs, div_enters) = counting("div", "box", vec![0.5]);
    let mut nexus =
        RuntimeNexus::new(vec![cards, divs], dom.host(), NexusConfig::default()).unwrap();
    let cards = ids(&nexus)[0];
    let el = dom.element("div", &["card"]);
    nexus.add_elements(&[el], None).unwrap();

    nexus
        .pause(&Scope::strategies([cards]).and_elements([el]))
        .unwrap();
    assert_eq!(dom.watchers_observing(el), 1);
    dom.emit(el, 0.6);
    assert_eq!((card_enters.get(), div_enters.get()), (0, 1));
    assert!(!dom.has_class(el, "rfx-in"));

    nexus
        .resume(&Scope::elements([el]).and_strategies([cards]))
        .unwrap();
    assert_eq!((card_enters.get(), div_enters.get()), (1, 1));
    assert!(dom.has_class(el, "rfx-in"));
}

#[test]
fn restart_lets_once_strategies_fire_again() {
    let dom = FakeHost::new();
    let (hero, enters) = counting(".hero", "hero", vec![0.0]);
    let mut nexus =
        RuntimeNexus::new(vec![hero.once(true)], dom.host(), NexusConfig::default()).unwrap();
    let el = dom.element("div", &["hero"]);
    nexus.add_elements(&[el], None).unwrap();

    dom.emit(el, 0.2);
    dom.emit(el, 0.0);
    dom.emit(el, 0.4);
    assert_eq!(enters.get(), 1);

    nexus.restart(&Scope::all()).unwrap();
    assert!(!dom.has_class(el, "hero-in"));
    assert!(dom.has_class(el, "hero"));
    dom.emit(el, 0.3);
    assert_eq!(enters.get(), 2);
    assert!(dom.has_class(el, "hero-in"));
}

#[test]
fn scoped_restart_replays_only_to_its_strategies() {
    let dom = FakeHost::new();
    let (cards, card_enters) = counting(".card", "rfx", vec![0.5]);
    let (divs, div_enters) = counting("div", "box", vec![0.5]);
    let mut nexus =
        RuntimeNexus::new(vec![cards, divs], dom.host(), NexusConfig::default()).unwrap();
    let cards = ids(&nexus)[0];
    let el = dom.element("div", &["card"]);
    nexus.add_elements(&[el], None).unwrap();
    dom.emit(el, 0.6);

    nexus.restart(&Scope::strategies([cards])).unwrap();
    assert_eq!((card_enters.get(), div_enters.get()), (2, 1));
    assert!(dom.has_class(el, "rfx-in"));
    assert!(dom.has_class(el, "box-in"));
}

#[test]
fn restart_keeps_paused_bindings_paused() {
    let dom = FakeHost::new();
    let (a, enters) = counting(".a", "a", vec![0.5]);
    let mut nexus = RuntimeNexus::new(vec![a], dom.host(), NexusConfig::default()).unwrap();
    let a = ids(&nexus)[0];
    let el = dom.element("div", &["a"]);
    nexus.add_elements(&[el], None).unwrap();

    nexus.pause(&Scope::all()).unwrap();
    nexus.restart(&Scope::all()).unwrap();
    assert_eq!(nexus.binding_state(el, a), Some(BindingState::Paused));
    dom.emit(el, 0.9);
    assert_eq!(enters.get(), 0);
}

#[test]
fn scopes_with_unknown_ids_are_rejected() {
    let dom = FakeHost::new();
    let (a, _) = counting(".a", "a", vec![0.5]);
    let mut nexus = RuntimeNexus::new(vec![a], dom.host(), NexusConfig::default()).unwrap();
    let el = dom.element("div", &["a"]);
    nexus.add_elements(&[el], None).unwrap();

    let bogus = StrategyId(77);
    assert_eq!(
        nexus.pause(&Scope::strategies([bogus])),
        Err(NexusError::UnknownStrategy(bogus))
    );
    assert_eq!(dom.watchers_observing(el), 1);
}

#[test]
fn destroy_is_terminal_and_idempotent() {
    let dom = FakeHost::new();
    let (a, enters) = counting(".a", "a", vec![0.5]);
    let (b, _) = counting(".b", "b", vec![0.25]);
    let mut nexus = RuntimeNexus::new(vec![a, b], dom.host(), NexusConfig::default()).unwrap();
    let el = dom.element("div", &["a", "b"]);
    nexus.add_elements(&[el], None).unwrap();
    dom.emit(el, 0.7);
    assert_eq!(dom.live_watchers(), 2);

    nexus.destroy();
    nexus.destroy();
    assert!(nexus.is_destroyed());
    assert_eq!(dom.live_watchers(), 0);
    assert_eq!(nexus.sentinel_count(), 0);
    assert!(nexus.get_strategies().is_empty());
    assert!(nexus.elements().is_empty());
    assert!(!dom.has_class(el, "a-in"));
    assert!(!dom.has_class(el, "b-in"));

    dom.emit(el, 0.0);
    dom.emit(el, 0.9);
    assert_eq!(enters.get(), 1);

    let (c, _) = counting(".c", "c", vec![0.5]);
    assert_eq!(nexus.add_strategy(c), Err(NexusError::Terminal));
    assert_eq!(nexus.add_elements(&[el], None), Err(NexusError::Terminal));
    assert_eq!(nexus.pause(&Scope::all()), Err(NexusError::Terminal));
    assert_eq!(nexus.restart(&Scope::all()), Err(NexusError::Terminal));
    assert_eq!(
        nexus.remove_strategy(StrategyId(0)),
        Err(NexusError::Terminal)
    );
}
