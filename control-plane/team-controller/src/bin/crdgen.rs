use kube::core::CustomResourceExt;
use team_controller::crd::team::Team;

fn main() {
    let crd = Team::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
