use scope_debugger::debugger::{Capture, Debugger, FrameExit, ScriptedHost, Shell};
use scope_debugger::executor::{BindingSet, BufferConsole, CellOutcome, Namespace, Value};
use scope_debugger::notify::MemoryNotifier;
use scope_debugger::DebugError;
use std::rc::Rc;

struct Session {
    debugger: Debugger,
    host: ScriptedHost,
    console: Rc<BufferConsole>,
    notifier: MemoryNotifier,
}

// Helper to attach a debugger with scripted input and recorded output
fn session() -> Session {
    let console = Rc::new(BufferConsole::new());
    let shell = Shell::new(console.clone());
    let host = ScriptedHost::new();
    let notifier = MemoryNotifier::new();
    let debugger = Debugger::attach(shell, Box::new(host.clone()), Box::new(notifier.clone()))
        .expect("Failed to attach debugger");
    Session {
        debugger,
        host,
        console,
        notifier,
    }
}

fn run(session: &Session, source: &str) -> CellOutcome {
    session.debugger.run_cell(source)
}

const G: &str = r#"fn g(x) {
  y = x + 1
  z = y * 2
  return z
}"#;

#[cfg(test)]
mod debugger_tests {
    use super::*;

    #[test]
    fn test_proxy_resume_sees_mutated_parameter() {
        let s = session();
        run(&s, "fn f(a) {\n  a = a + 1\n  return a\n}\nf = proxy(f)");
        s.host.cell("a = 10").cell("resume");

        assert_eq!(run(&s, "f(5)"), CellOutcome::Displayed(Value::Int(11)));
        assert_eq!(s.host.pending(), 0);
        assert_eq!(s.debugger.depth(), 0);
    }

    #[test]
    fn test_proxy_forced_return() {
        let s = session();
        run(&s, "fn f(a) {\n  a = a + 1\n  return a\n}\nf = proxy(f)");
        s.host.cell("a = 10").cell("return a");

        assert_eq!(run(&s, "f(5)"), CellOutcome::Displayed(Value::Int(10)));
    }

    #[test]
    fn test_successive_cells_share_frame_scope() {
        let s = session();
        run(&s, "fn f(a) { return a }\nf = proxy(f)");
        s.host
            .cell("b = a * 3")
            .cell("c = b + 1")
            .cell("return [a, b, c]");

        assert_eq!(
            run(&s, "f(2)"),
            CellOutcome::Displayed(Value::list(vec![
                Value::Int(2),
                Value::Int(6),
                Value::Int(7)
            ]))
        );
        // frame-local names do not leak into the module
        assert_eq!(
            run(&s, "b"),
            CellOutcome::Failed("name 'b' is not defined".to_string())
        );
    }

    #[test]
    fn test_disabled_breakpoint_is_skipped_and_next_one_stops() {
        let s = session();
        run(&s, G);
        let g = s.debugger.lookup("g").unwrap();
        let first = s.debugger.create_breakpoint(&g, Some(2)).unwrap();
        let second = s.debugger.create_breakpoint(&g, Some(3)).unwrap();
        s.debugger.breakpoints().disable(&[first]).unwrap();

        s.host
            .inspect(|d| {
                let frame = d.current_frame().expect("suspended frame");
                assert_eq!(frame.name(), "g");
                assert_eq!(frame.bindings().get("y"), Some(Value::Int(2)));
                Ok(())
            })
            .cell("return 99");

        assert_eq!(run(&s, "g(1)"), CellOutcome::Displayed(Value::Int(99)));
        assert_eq!(s.notifier.scopes(), vec!["g", "__main__"]);
        assert!(s.debugger.breakpoints().exists(second));
    }

    #[test]
    fn test_guard_stop_shares_locals_with_the_routine() {
        let s = session();
        run(&s, G);
        let g = s.debugger.lookup("g").unwrap();
        s.debugger.create_breakpoint(&g, Some(3)).unwrap();
        s.host.cell("y = 50").cell("resume");

        assert_eq!(run(&s, "g(1)"), CellOutcome::Displayed(Value::Int(100)));
    }

    #[test]
    fn test_ignore_count_then_real_stop() {
        let s = session();
        run(&s, G);
        let g = s.debugger.lookup("g").unwrap();
        let id = s.debugger.create_breakpoint(&g, None).unwrap();
        s.debugger.breakpoints().set_ignore_count(&[id], 2).unwrap();
        s.host.cell("resume");

        assert_eq!(
            run(&s, "[g(1), g(1), g(1)]"),
            CellOutcome::Displayed(Value::list(vec![
                Value::Int(4),
                Value::Int(4),
                Value::Int(4)
            ]))
        );
        assert_eq!(s.host.pending(), 0);
        assert_eq!(s.notifier.scopes().len(), 2);
        assert_eq!(s.debugger.breakpoints().get(id).unwrap().ignore_count, 0);
    }

    #[test]
    fn test_temporary_breakpoint_fires_once() {
        let s = session();
        run(&s, G);
        let g = s.debugger.lookup("g").unwrap();
        let id = s.debugger.create_breakpoint(&g, Some(4)).unwrap();
        s.debugger.breakpoints().set_temporary(&[id], true).unwrap();
        s.host.cell("resume");

        assert_eq!(run(&s, "g(1)"), CellOutcome::Displayed(Value::Int(4)));
        assert!(s.debugger.breakpoints().list().is_empty());
        assert!(!s.debugger.breakpoints().exists(id));

        // would fail with a closed host if it stopped again
        assert_eq!(run(&s, "g(1)"), CellOutcome::Displayed(Value::Int(4)));
    }

    #[test]
    fn test_nested_frames_and_exit_targets_top() {
        let s = session();
        let shell = s.debugger.shell();
        let first = shell.make_module("m1");
        let second = shell.make_module("m2");
        let third = shell.make_module("m3");

        s.host
            .inspect(move |d| {
                let exit = d.enter_frame(&second, BindingSet::new(), Some("second"), Capture::none())?;
                assert_eq!(exit, FrameExit::Resume);
                Ok(())
            })
            .inspect(move |d| {
                let exit = d.enter_frame(&third, BindingSet::new(), Some("third"), Capture::none())?;
                assert_eq!(exit, FrameExit::Return(Value::Int(3)));
                Ok(())
            })
            .inspect(|d| {
                assert_eq!(d.depth(), 3);
                assert_eq!(d.active_namespace().name(), "m3");
                assert_eq!(d.current_frame().unwrap().name(), "third");
                d.exit_frame(FrameExit::Return(Value::Int(3)))
            })
            .inspect(|d| {
                assert_eq!(d.depth(), 2);
                assert_eq!(d.active_namespace().name(), "m2");
                d.exit_frame(FrameExit::Resume)
            })
            .inspect(|d| {
                assert_eq!(d.depth(), 1);
                assert_eq!(d.active_namespace().name(), "m1");
                d.exit_frame(FrameExit::Return(Value::Int(1)))
            });

        let exit = s
            .debugger
            .enter_frame(&first, BindingSet::new(), Some("first"), Capture::none())
            .unwrap();
        assert_eq!(exit, FrameExit::Return(Value::Int(1)));
        assert_eq!(s.debugger.depth(), 0);
        assert_eq!(s.debugger.active_namespace().name(), "__main__");
        assert_eq!(
            s.notifier.scopes(),
            vec!["first", "second", "third", "second", "first", "__main__"]
        );
    }

    #[test]
    fn test_unnamed_frame_label() {
        let s = session();
        let main = s.debugger.shell().main().clone();
        s.host.inspect(|d| {
            assert_eq!(d.current_frame().unwrap().name(), "<unknown>");
            d.exit_frame(FrameExit::Resume)
        });
        s.debugger
            .enter_frame(&main, BindingSet::new(), None, Capture::none())
            .unwrap();
    }

    #[test]
    fn test_exit_without_frame_is_rejected() {
        let s = session();
        assert_eq!(
            s.debugger.exit_frame(FrameExit::Resume),
            Err(DebugError::NotInFrame)
        );
        assert!(matches!(run(&s, "resume"), CellOutcome::Failed(_)));
    }

    #[test]
    fn test_enter_module_twice_notifies_once() {
        let s = session();
        let tools = s.debugger.shell().make_module("tools");
        s.debugger.enter_module(&tools).unwrap();
        s.debugger.enter_module(&tools).unwrap();
        assert_eq!(s.notifier.scopes(), vec!["tools"]);

        run(&s, "x = 1");
        assert_eq!(tools.get("x"), Some(Value::Int(1)));
        assert_eq!(s.debugger.root_namespace().name(), "tools");
    }

    #[test]
    fn test_enter_module_refused_inside_frame() {
        let s = session();
        let main = s.debugger.shell().main().clone();
        let tools = s.debugger.shell().make_module("tools");
        s.host.inspect(move |d| {
            assert_eq!(
                d.enter_module(&tools),
                Err(DebugError::FrameActive("f".to_string()))
            );
            d.exit_frame(FrameExit::Resume)
        });
        s.debugger
            .enter_frame(&main, BindingSet::new(), Some("f"), Capture::none())
            .unwrap();
    }

    #[test]
    fn test_unregistered_namespace_is_rejected_without_side_effects() {
        let s = session();
        s.host.cell("1");
        let stray = Namespace::new("stray");
        assert_eq!(
            s.debugger
                .enter_frame(&stray, BindingSet::new(), Some("f"), Capture::none()),
            Err(DebugError::NamespaceMismatch("stray".to_string()))
        );
        assert_eq!(s.debugger.depth(), 0);
        assert_eq!(s.host.pending(), 1);
        assert!(s.notifier.scopes().is_empty());
    }

    #[test]
    fn test_second_attach_fails() {
        let s = session();
        let shell = s.debugger.shell().clone();
        let second = Debugger::attach(
            shell.clone(),
            Box::new(ScriptedHost::new()),
            Box::new(MemoryNotifier::new()),
        );
        assert!(matches!(second, Err(DebugError::AlreadyAttached)));

        drop(s);
        assert!(Debugger::attach(
            shell,
            Box::new(ScriptedHost::new()),
            Box::new(MemoryNotifier::new())
        )
        .is_ok());
    }

    #[test]
    fn test_faulting_cell_leaves_frame_usable() {
        let s = session();
        run(&s, "fn f(a) { return a }\nf = proxy(f)");
        s.host
            .cell("q = undefined_name")
            .cell("a")
            .cell("return a + 1");

        assert_eq!(run(&s, "f(5)"), CellOutcome::Displayed(Value::Int(6)));
        assert_eq!(
            s.console.errors(),
            vec!["name 'undefined_name' is not defined".to_string()]
        );
    }

    #[test]
    fn test_host_closing_restores_target() {
        let s = session();
        run(&s, "fn f(a) { return a }\nf = proxy(f)");
        s.host.cell("a = 2");

        let outcome = run(&s, "f(1)");
        assert_eq!(outcome, CellOutcome::Failed("host loop closed".to_string()));
        assert_eq!(s.debugger.depth(), 0);
        assert_eq!(s.debugger.shell().target().label, "__main__");
        assert_eq!(run(&s, "1 + 1"), CellOutcome::Displayed(Value::Int(2)));
    }

    #[test]
    fn test_proxy_keeps_identity_and_rejects_values() {
        let s = session();
        run(&s, "fn f() { }\nsetmeta(f, \"doc\", \"hello\")\np = proxy(f)");
        assert_eq!(run(&s, "name(p)"), CellOutcome::Displayed(Value::str("f")));
        assert_eq!(
            run(&s, "meta(p, \"doc\")"),
            CellOutcome::Displayed(Value::str("hello"))
        );
        assert_eq!(
            s.debugger.wrap_as_breakpoint(&Value::Int(3)),
            Err(DebugError::NotCallable("3".to_string()))
        );
    }

    #[test]
    fn test_proxy_captures_outer_cells_by_reference() {
        let s = session();
        run(
            &s,
            "fn make() {\n  count = 1\n  fn inner() { return count }\n  return inner\n}\nc = make()\np = proxy(c)",
        );
        s.host
            .inspect(|d| {
                assert!(!d.current_frame().unwrap().copied_by_value());
                Ok(())
            })
            .cell("count = 5")
            .cell("resume");

        assert_eq!(run(&s, "p()"), CellOutcome::Displayed(Value::Int(5)));
        assert_eq!(run(&s, "c()"), CellOutcome::Displayed(Value::Int(5)));
    }

    #[test]
    fn test_guard_stop_copies_outer_variables() {
        let s = session();
        run(
            &s,
            "fn make() {\n  count = 1\n  fn inner() {\n    x = count\n    return x\n  }\n  return inner\n}\nc = make()",
        );
        let c = s.debugger.lookup("c").unwrap();
        s.debugger.create_breakpoint(&c, None).unwrap();
        s.host
            .inspect(|d| {
                let frame = d.current_frame().unwrap();
                assert!(frame.copied_by_value());
                assert_eq!(frame.name(), "make.inner");
                Ok(())
            })
            .cell("count = 9")
            .cell("resume");

        assert_eq!(run(&s, "c()"), CellOutcome::Displayed(Value::Int(1)));
    }

    #[test]
    fn test_load_module_and_dotted_lookup() {
        let s = session();
        let module = s
            .debugger
            .load_module("geometry", "fn area(w, h) { return w * h }\nunit = 1")
            .unwrap();
        assert_eq!(module.get("unit"), Some(Value::Int(1)));
        let area = s.debugger.lookup("geometry.area").unwrap();
        s.debugger.create_breakpoint(&area, None).unwrap();
        s.host.cell("return w + h");

        s.debugger.enter_module(&module).unwrap();
        assert_eq!(run(&s, "area(3, 4)"), CellOutcome::Displayed(Value::Int(7)));
        assert!(s.debugger.load_module("broken", "x = (").is_err());
    }

    #[test]
    fn test_runaway_recursion_fails_the_cell_only() {
        let s = session();
        let failed = CellOutcome::Failed("maximum call depth exceeded calling f()".to_string());
        assert_eq!(run(&s, "fn f(n) { return f(n + 1) }\nf(0)"), failed);
        assert_eq!(run(&s, "1 + 1"), CellOutcome::Displayed(Value::Int(2)));
        assert_eq!(run(&s, "f(0)"), failed);

        let deep = "fn down(n) {\n  if n == 0 { return 0 }\n  return down(n - 1)\n}\ndown(50)";
        assert_eq!(run(&s, deep), CellOutcome::Displayed(Value::Int(0)));
    }
}

