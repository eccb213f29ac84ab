use permitree::*;
use std::rc::Rc;

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut acl = Acl::new();

    acl.add_role("visitor", vec![])?;
    acl.add_role("contributor", vec!["visitor"])?;
    acl.add_role("maintainer", vec!["contributor"])?;
    acl.add_role("owner", vec![])?;

    // visitors may only view
    acl.allow(Some(vec!["visitor"]), None, Some(vec!["view"]), None)?;

    // contributors inherit view from visitor, plus some privileges of their own
    acl.allow(Some(vec!["contributor"]), None, Some(vec!["comment", "push"]), None)?;

    // maintainers inherit view, comment, and push, and run the project day to day
    acl.allow(Some(vec!["maintainer"]), None, Some(vec!["triage", "merge"]), None)?;

    // owners inherit nothing, but are allowed all privileges
    acl.allow(Some(vec!["owner"]), None, None, None)?;

    acl.add_resource("project", None)?;
    acl.add_resource("issues", Some("project"))?;
    acl.add_resource("releases", Some("project"))?;

    // maintainers may tag releases
    acl.allow(Some(vec!["maintainer"]), Some(vec!["releases"]), Some(vec!["tag"]), None)?;

    // everyone, owners included, is denied deleting published releases
    acl.deny(None, Some(vec!["releases"]), Some(vec!["delete"]), None)?;

    // tagging is only allowed while a release window is open
    let window_open: Assertion = Rc::new(|_acl, _role, _resource, _privilege| true);
    acl.allow(Some(vec!["maintainer"]), Some(vec!["releases"]), Some(vec!["tag"]), Some(window_open))?;

    println!(
        "maintainer may view issues:      {}",
        acl.is_allowed(Some("maintainer"), Some("issues"), Some("view"))?
    );
    println!(
        "contributor may merge:           {}",
        acl.is_allowed(Some("contributor"), Some("project"), Some("merge"))?
    );
    println!(
        "owner may delete a release:      {}",
        acl.is_allowed(Some("owner"), Some("releases"), Some("delete"))?
    );

    // "issues:451" is never registered; it inherits the rules of "issues"
    println!(
        "visitor may view issue 451:      {}",
        acl.is_allowed(Some("visitor"), Some("issues:451"), Some("view"))?
    );

    println!(
        "roles allowed to tag releases:   {:?}",
        acl.roles_allowed_for(Some(vec!["releases"]), Some("tag"))?
    );

    Ok(())
} // main
