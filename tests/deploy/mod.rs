mod bdd_steps;
mod scenarios;
mod test_doubles;
mod test_helpers;
